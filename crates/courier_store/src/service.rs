//! Transport-agnostic request dispatcher.
//!
//! Whatever fronts the relay (HTTP, WebSocket, a test harness) deserialises a
//! `RelayRequest`, calls `Store::handle` and serialises the `RelayResponse`.

use tracing::warn;

use courier_proto::api::{RelayRequest, RelayResponse};

use crate::{db::Store, error::StoreError};

impl Store {
    pub async fn handle(&self, request: RelayRequest) -> RelayResponse {
        match self.dispatch(request).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(code = e.code(), error = %e, "relay request failed");
                RelayResponse::Error {
                    error: e.to_string(),
                    code: e.code().to_string(),
                }
            }
        }
    }

    async fn dispatch(&self, request: RelayRequest) -> Result<RelayResponse, StoreError> {
        let resp = match request {
            RelayRequest::Submit { envelope } => {
                let stored = self.submit(envelope).await?;
                RelayResponse::Submitted {
                    id: stored.id,
                    received_at: stored.received_at,
                    cursor: stored.cursor,
                }
            }
            RelayRequest::PullPending { recipient_key, since, limit } => RelayResponse::Messages {
                messages: self.deliver_pending(&recipient_key, since, limit).await?,
            },
            RelayRequest::FetchConversation { party_a, party_b, limit, before } => {
                RelayResponse::Messages {
                    messages: self.fetch_conversation(&party_a, &party_b, limit, before).await?,
                }
            }
            RelayRequest::FetchThread { thread_id } => RelayResponse::Messages {
                messages: self.fetch_thread(&thread_id).await?,
            },
            RelayRequest::Acknowledge { recipient_key, message_ids } => RelayResponse::Acknowledged {
                acked: self.acknowledge(&recipient_key, &message_ids).await?,
            },
            RelayRequest::PublishIdentity { identity, signature } => {
                let published = self.publish_identity(&identity, &signature).await?;
                RelayResponse::IdentityPublished {
                    signing_key: published.signing_key,
                }
            }
            RelayRequest::LookupIdentity { signing_key } => RelayResponse::Identity {
                identity: self.lookup_identity(&signing_key).await?,
            },
        };
        Ok(resp)
    }
}
