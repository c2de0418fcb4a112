//! Teloxide transports feeding the [`Dispatcher`].
//!
//! Long polling and the webhook listener both convert incoming updates with
//! [`crate::update::Update::from_telegram`] and hand them to the same dispatcher.

use std::sync::Arc;

use teloxide::dispatching::Dispatcher as PollingDispatcher;
use teloxide::prelude::*;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::client::BotClient;
use crate::config::WebhookConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{BotError, Result};
use crate::update::Update as CoreUpdate;
use crate::webhook::{create_router, WebhookRoutes};

/// The running bot: a teloxide handle plus the dispatcher it feeds.
pub struct TimeBot {
    bot: Bot,
    dispatcher: Arc<Dispatcher>,
}

impl TimeBot {
    pub fn new(bot: Bot, dispatcher: Arc<Dispatcher>) -> Self {
        Self { bot, dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Publishes the public command list as the Telegram command menu.
    pub async fn publish_commands(&self) -> Result<()> {
        let commands: Vec<(String, String)> = self
            .dispatcher
            .context()
            .registry
            .public_commands()
            .into_iter()
            .map(|d| (d.name.to_string(), d.description.to_string()))
            .collect();
        self.dispatcher.client().set_my_commands(&commands).await?;
        info!(count = commands.len(), "Published command menu");
        Ok(())
    }

    /// Runs long polling until Ctrl+C.
    pub async fn start_polling(&self) -> Result<()> {
        info!("Starting Telegram bot in polling mode...");

        let dispatcher = Arc::clone(&self.dispatcher);
        let handler = dptree::entry().endpoint(move |upd: Update| {
            let dispatcher = Arc::clone(&dispatcher);
            async move {
                match CoreUpdate::from_telegram(&upd) {
                    Some(update) => {
                        let outcome = dispatcher.dispatch(update).await;
                        debug!(update_id = upd.id.0, ?outcome, "Polled update handled");
                    }
                    None => debug!(update_id = upd.id.0, "Ignoring unsupported update kind"),
                }
                respond(())
            }
        });

        PollingDispatcher::builder(self.bot.clone(), handler)
            .default_handler(|upd| async move {
                warn!("Unhandled update: {:?}", upd);
            })
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        info!("Bot stopped");
        Ok(())
    }

    /// Serves the webhook routes until Ctrl+C, registering the public URL
    /// with Telegram first when one is configured.
    pub async fn start_webhook(&self, config: &WebhookConfig, link_secret: Option<String>) -> Result<()> {
        let addr = format!("{}:{}", config.host, config.port);
        info!(addr = %addr, path = %config.path, "Starting Telegram bot in webhook mode...");

        if let Some(public_url) = &config.public_url {
            let url = public_url
                .join(config.path.trim_start_matches('/'))
                .map_err(|e| BotError::Config(format!("webhook URL: {e}")))?;
            let mut request = self.bot.set_webhook(url.clone());
            if let Some(secret) = &config.secret {
                request = request.secret_token(secret.clone());
            }
            request
                .await
                .map_err(|e| BotError::Startup(format!("setWebhook failed: {e}")))?;
            info!(url = %url, "Webhook registered");
        } else {
            warn!("TIMEBOT_WEBHOOK_URL not set; assuming the webhook is registered elsewhere");
        }

        let router = create_router(
            Arc::clone(&self.dispatcher),
            WebhookRoutes {
                path: config.path.clone(),
                secret: config.secret.clone(),
                link_secret,
            },
        );
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| BotError::Startup(format!("bind {addr}: {e}")))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutdown signal received");
            })
            .await?;

        info!("Bot stopped");
        Ok(())
    }
}
