//! Best-effort broadcast of todo changes to the push broker.

use crate::connection::{ConnectionState, Supervisor};
use crate::credentials::{CredentialProvider, IdentitySettings, TokenSource};
use crate::error::{error, Error, ErrorKind};
use crate::hub::{Connector, HubOptions, WebSocketConnector};
use crate::message::HubTarget;
use async_trait::async_trait;
use events::Id;
use log::*;
use secrecy::SecretString;
use serde_json::{json, Value};
use service::config::Config;
use std::sync::Arc;

/// One broadcast per kind of todo change.
///
/// Implementations must never block the caller on an unavailable broker: an
/// event that cannot be delivered is dropped. The only error surfaced is a
/// failed write on an established connection.
#[async_trait]
pub trait PushService: Send + Sync {
    async fn send_list_created(&self, list_id: Id, name: &str) -> Result<(), Error>;

    async fn send_list_renamed(&self, list_id: Id, name: &str) -> Result<(), Error>;

    async fn send_list_deleted(&self, list_id: Id) -> Result<(), Error>;

    async fn send_item_added(&self, list_id: Id, item_id: Id, text: &str) -> Result<(), Error>;

    async fn send_item_text_changed(
        &self,
        list_id: Id,
        item_id: Id,
        text: &str,
    ) -> Result<(), Error>;

    async fn send_item_done_changed(
        &self,
        list_id: Id,
        item_id: Id,
        done: bool,
    ) -> Result<(), Error>;

    async fn send_item_deleted(&self, list_id: Id, item_id: Id) -> Result<(), Error>;
}

/// Relays todo changes to the push broker over a lazily (re)established connection.
pub struct PushRelay {
    supervisor: Supervisor,
}

impl PushRelay {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        connector: Arc<dyn Connector>,
        broker_url: impl Into<String>,
    ) -> Self {
        Self {
            supervisor: Supervisor::new(tokens, connector, broker_url),
        }
    }

    /// Build a relay talking to the identity server and broker named in `config`.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let (Some(identity_url), Some(broker_url), Some(client_id), Some(client_secret)) = (
            config.identity_server_url(),
            config.push_server_url(),
            config.push_client_id(),
            config.push_client_secret(),
        ) else {
            return Err(error(
                ErrorKind::Config,
                "push relay needs IDENTITY_SERVER_URL, PUSH_SERVER_URL, PUSH_CLIENT_ID and PUSH_CLIENT_SECRET",
            ));
        };

        let tokens = CredentialProvider::new(IdentitySettings {
            url: identity_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: SecretString::new(client_secret.to_string()),
            scope: config.push_scope().to_string(),
            timeout: config.push_request_timeout(),
        })?;

        let connector = WebSocketConnector::new(HubOptions {
            handshake_timeout: config.push_handshake_timeout(),
            keep_alive: config.push_keep_alive(),
        });

        Ok(Self::new(Arc::new(tokens), Arc::new(connector), broker_url))
    }

    pub async fn start(&self) {
        self.supervisor.start().await;
    }

    pub async fn stop(&self) {
        self.supervisor.stop().await;
    }

    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    async fn send(&self, target: HubTarget, arguments: Vec<Value>) -> Result<(), Error> {
        let Some(active) = self.supervisor.ensure_connected().await else {
            debug!("Push broker unavailable, dropping {target}");
            return Ok(());
        };

        let result = tokio::select! {
            _ = self.supervisor.shutdown_token().cancelled() => {
                debug!("Push relay stopping, dropping {target}");
                return Ok(());
            }
            result = active.connection.send(target.name(), arguments) => result,
        };

        if let Err(e) = result {
            if let Some(stale) = self.supervisor.discard(active.generation) {
                if let Err(e) = stale.connection.close().await {
                    warn!("Error while closing push broker connection: {e}");
                }
            }
            return Err(e);
        }

        Ok(())
    }
}

#[async_trait]
impl PushService for PushRelay {
    async fn send_list_created(&self, list_id: Id, name: &str) -> Result<(), Error> {
        debug!("Broadcasting list {list_id} created: {name}");
        self.send(HubTarget::ListAdded, vec![json!(list_id), json!(name)])
            .await
    }

    async fn send_list_renamed(&self, list_id: Id, name: &str) -> Result<(), Error> {
        debug!("Broadcasting list {list_id} renamed: {name}");
        self.send(HubTarget::ListRenamed, vec![json!(list_id), json!(name)])
            .await
    }

    async fn send_list_deleted(&self, list_id: Id) -> Result<(), Error> {
        debug!("Broadcasting list {list_id} deleted");
        self.send(HubTarget::ListDeleted, vec![json!(list_id)]).await
    }

    async fn send_item_added(&self, list_id: Id, item_id: Id, text: &str) -> Result<(), Error> {
        debug!("Broadcasting item {item_id} added to list {list_id}: {text}");
        self.send(
            HubTarget::ItemAdded,
            vec![json!(list_id), json!(item_id), json!(text)],
        )
        .await
    }

    async fn send_item_text_changed(
        &self,
        list_id: Id,
        item_id: Id,
        text: &str,
    ) -> Result<(), Error> {
        debug!("Broadcasting item {item_id} of list {list_id} renamed: {text}");
        self.send(
            HubTarget::ItemNameChanged,
            vec![json!(list_id), json!(item_id), json!(text)],
        )
        .await
    }

    async fn send_item_done_changed(
        &self,
        list_id: Id,
        item_id: Id,
        done: bool,
    ) -> Result<(), Error> {
        debug!("Broadcasting item {item_id} of list {list_id} done: {done}");
        self.send(
            HubTarget::ItemDoneChanged,
            vec![json!(list_id), json!(item_id), json!(done)],
        )
        .await
    }

    async fn send_item_deleted(&self, list_id: Id, item_id: Id) -> Result<(), Error> {
        debug!("Broadcasting item {item_id} deleted from list {list_id}");
        self.send(HubTarget::ItemDeleted, vec![json!(list_id), json!(item_id)])
            .await
    }
}

/// Drops every broadcast. Used when the relay is not configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPushService;

#[async_trait]
impl PushService for NoopPushService {
    async fn send_list_created(&self, _list_id: Id, _name: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn send_list_renamed(&self, _list_id: Id, _name: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn send_list_deleted(&self, _list_id: Id) -> Result<(), Error> {
        Ok(())
    }

    async fn send_item_added(&self, _list_id: Id, _item_id: Id, _text: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn send_item_text_changed(
        &self,
        _list_id: Id,
        _item_id: Id,
        _text: &str,
    ) -> Result<(), Error> {
        Ok(())
    }

    async fn send_item_done_changed(
        &self,
        _list_id: Id,
        _item_id: Id,
        _done: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    async fn send_item_deleted(&self, _list_id: Id, _item_id: Id) -> Result<(), Error> {
        Ok(())
    }
}
