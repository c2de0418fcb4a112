//! Telegram front end for Timebot.
//!
//! Every update, whether it arrives by webhook or long polling, goes through
//! one [`Dispatcher`]: it loads the conversation for the (bot, chat, user)
//! key, authenticates the sender, runs one step of a command or dialog, saves
//! the resulting session and delivers the replies.
//!
//! # Environment Variables
//!
//! Required:
//! - `TELEGRAM_BOT_TOKEN`: Bot token from @BotFather
//!
//! Optional:
//! - `TIMEBOT_BOT_ID`: session key prefix (default: the bot username)
//! - `TIMEBOT_WEBHOOK_HOST`, `TIMEBOT_WEBHOOK_PORT`, `TIMEBOT_WEBHOOK_PATH`,
//!   `TIMEBOT_WEBHOOK_SECRET`, `TIMEBOT_WEBHOOK_URL`
//! - `TIMEBOT_LINK_SECRET`, `TIMEBOT_LINK_API_SECRET`,
//!   `TIMEBOT_LINK_BASE_URL`, `TIMEBOT_LINK_TTL_SECS`
//! - `TIMEBOT_SESSION_TTL_DAYS`, `TIMEBOT_EXTERNAL_TIMEOUT_SECS`,
//!   `TIMEBOT_PAGE_SIZE`, `TIMEBOT_DATA_FILE`
//!
//! # Commands
//!
//! - `/help` - Show available commands
//! - `/projects` - List projects you can book time on
//! - `/add [project hours [description]]` - Log time
//! - `/edit [id]` - Change a time entry
//! - `/report [period]` - Hours per project
//! - `/rename [project]` - Rename a project you manage
//! - `/adduser [project]` - Add a member to a project you manage
//! - `/cancel` - Abandon the current dialog

pub mod bot;
pub mod client;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod link;
pub mod registry;
pub mod reply;
pub mod router;
pub mod session;
pub mod update;
pub mod webhook;

pub use bot::TimeBot;
pub use client::{BotClient, TeloxideClient};
pub use commands::builtin_registry;
pub use config::{BotConfig, DispatchSettings, WebhookConfig};
pub use dispatcher::{DispatchOutcome, Dispatcher, ErrorContext, ErrorReporter, TracingReporter};
pub use error::{BotError, DeliveryError, Result};
pub use link::{complete_link, LinkClaims, LinkError, LinkTokens};
pub use registry::{Command, CommandDescriptor, CommandRegistry, Context, Principal};
pub use reply::{Button, Keyboard, Reply, ReplyMode, SessionChange, Transition};
pub use router::{CallbackPayload, CallbackRouter, RouteOutcome};
pub use session::{Dialog, Session, SessionKey, Sessions};
pub use update::{MessageRef, Sender, Update, UpdateKind};
pub use webhook::{create_router, WebhookRoutes};
