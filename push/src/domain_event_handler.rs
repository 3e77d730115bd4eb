use crate::relay::PushService;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler, HandlerError};
use log::*;
use std::sync::Arc;

/// Forwards committed domain events to the push broker.
pub struct PushDomainEventHandler {
    push: Arc<dyn PushService>,
}

impl PushDomainEventHandler {
    pub fn new(push: Arc<dyn PushService>) -> Self {
        Self { push }
    }
}

#[async_trait]
impl EventHandler for PushDomainEventHandler {
    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        trace!("Relaying domain event {event:?}");

        match event {
            DomainEvent::ListCreated { list_id, name } => {
                self.push.send_list_created(*list_id, name).await?
            }
            DomainEvent::ListRenamed { list_id, name } => {
                self.push.send_list_renamed(*list_id, name).await?
            }
            DomainEvent::ListDeleted { list_id } => self.push.send_list_deleted(*list_id).await?,
            DomainEvent::ItemAdded {
                list_id,
                item_id,
                text,
            } => self.push.send_item_added(*list_id, *item_id, text).await?,
            DomainEvent::ItemTextChanged {
                list_id,
                item_id,
                text,
            } => {
                self.push
                    .send_item_text_changed(*list_id, *item_id, text)
                    .await?
            }
            DomainEvent::ItemDoneChanged {
                list_id,
                item_id,
                done,
            } => {
                self.push
                    .send_item_done_changed(*list_id, *item_id, *done)
                    .await?
            }
            DomainEvent::ItemDeleted { list_id, item_id } => {
                self.push.send_item_deleted(*list_id, *item_id).await?
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error, Error, ErrorKind};
    use crate::relay::PushRelay;
    use crate::testing::{FakeConnector, FakeTokens};
    use events::{EventPublisher, Id};
    use serde_json::json;

    #[tokio::test]
    async fn maps_every_event_to_its_broadcast() {
        let connector = FakeConnector::new();
        let relay = Arc::new(PushRelay::new(
            FakeTokens::granting("tok"),
            connector.clone(),
            "http://broker.test",
        ));
        let handler = PushDomainEventHandler::new(relay);

        let events = vec![
            DomainEvent::ListCreated {
                list_id: 1,
                name: "Groceries".to_string(),
            },
            DomainEvent::ListRenamed {
                list_id: 1,
                name: "Errands".to_string(),
            },
            DomainEvent::ItemAdded {
                list_id: 1,
                item_id: 4,
                text: "Milk".to_string(),
            },
            DomainEvent::ItemTextChanged {
                list_id: 1,
                item_id: 4,
                text: "Oat milk".to_string(),
            },
            DomainEvent::ItemDoneChanged {
                list_id: 1,
                item_id: 4,
                done: true,
            },
            DomainEvent::ItemDeleted {
                list_id: 1,
                item_id: 4,
            },
            DomainEvent::ListDeleted { list_id: 1 },
        ];

        for event in &events {
            handler.handle(event).await.unwrap();
        }

        assert_eq!(
            connector.last().sent(),
            vec![
                ("ListAdded".to_string(), vec![json!(1), json!("Groceries")]),
                ("ListRenamed".to_string(), vec![json!(1), json!("Errands")]),
                ("ItemAdded".to_string(), vec![json!(1), json!(4), json!("Milk")]),
                ("ItemNameChanged".to_string(), vec![json!(1), json!(4), json!("Oat milk")]),
                ("ItemDoneChanged".to_string(), vec![json!(1), json!(4), json!(true)]),
                ("ItemDeleted".to_string(), vec![json!(1), json!(4)]),
                ("ListDeleted".to_string(), vec![json!(1)]),
            ]
        );
    }

    struct BrokenPush;

    #[async_trait]
    impl PushService for BrokenPush {
        async fn send_list_created(&self, _list_id: Id, _name: &str) -> Result<(), Error> {
            Err(error(ErrorKind::Send, "broken pipe"))
        }
        async fn send_list_renamed(&self, _list_id: Id, _name: &str) -> Result<(), Error> {
            Ok(())
        }
        async fn send_list_deleted(&self, _list_id: Id) -> Result<(), Error> {
            Ok(())
        }
        async fn send_item_added(&self, _l: Id, _i: Id, _text: &str) -> Result<(), Error> {
            Ok(())
        }
        async fn send_item_text_changed(&self, _l: Id, _i: Id, _text: &str) -> Result<(), Error> {
            Ok(())
        }
        async fn send_item_done_changed(&self, _l: Id, _i: Id, _done: bool) -> Result<(), Error> {
            Ok(())
        }
        async fn send_item_deleted(&self, _l: Id, _i: Id) -> Result<(), Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_errors_reach_the_publisher() {
        let publisher =
            EventPublisher::new().with_handler(Arc::new(PushDomainEventHandler::new(Arc::new(BrokenPush))));

        let result = publisher
            .publish(DomainEvent::ListCreated {
                list_id: 7,
                name: "Groceries".to_string(),
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("broken pipe"));
    }

    #[tokio::test]
    async fn detached_publish_never_fails_the_caller() {
        let publisher =
            EventPublisher::new().with_handler(Arc::new(PushDomainEventHandler::new(Arc::new(BrokenPush))));

        let observer = publisher.publish_detached(DomainEvent::ListCreated {
            list_id: 7,
            name: "Groceries".to_string(),
        });

        assert!(observer.await.is_ok());
    }
}
