use http::StatusCode;
use tracing::{Level, event};
use uuid::Uuid;

use super::operation::OperationExecutor;
use crate::continuation::FeedContinuation;
use crate::core::{CancellationSignal, DriverError, Result, headers};
use crate::request::OperationRequest;

/// One page of a feed read.
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub status: StatusCode,
    pub body: Option<serde_json::Value>,
    /// Serialized continuation after this page; resume from it later.
    pub continuation: String,
    pub is_done: bool,
    pub session_token: Option<String>,
}

impl FeedPage {
    pub fn has_changes(&self) -> bool {
        self.status != StatusCode::NOT_MODIFIED
    }
}

impl OperationExecutor {
    /// Reads the next page for the continuation's current range.
    ///
    /// Splits reported by the service are repaired in place and the read is
    /// retried against the first child range.
    pub async fn read_next_page(
        &self,
        continuation: &mut FeedContinuation,
        template: &OperationRequest,
        cancellation: &CancellationSignal,
    ) -> Result<FeedPage> {
        let mut split_repairs = 0u32;
        loop {
            cancellation.check()?;
            let entry = continuation.current()?.clone();
            let mut request = template.clone();
            request.activity_id = Uuid::new_v4();
            request.partition_key_range_id = None;
            request.set_header(headers::START_EPK, entry.range.min_inclusive())?;
            request.set_header(headers::END_EPK, entry.range.max_exclusive())?;
            request.remove_header(headers::CONTINUATION);
            request.remove_header(headers::IF_NONE_MATCH);
            if let Some(token) = entry.token.as_deref() {
                let name = if request.change_feed {
                    headers::IF_NONE_MATCH
                } else {
                    headers::CONTINUATION
                };
                request.set_header(name, token)?;
            }

            let mut chain = self.data_chain(cancellation.clone());
            match self.execute_with_chain(request, &mut chain).await {
                Ok(response) => {
                    if let Some(rid) = response.container_rid() {
                        continuation.check_container(rid)?;
                    }
                    if response.status == StatusCode::NOT_MODIFIED {
                        continuation
                            .advance_without_changes(response.etag().map(str::to_string))?;
                    } else if template.change_feed {
                        continuation.advance_change_feed(response.etag().map(str::to_string))?;
                    } else {
                        continuation.advance(response.continuation().map(str::to_string))?;
                    }
                    return Ok(FeedPage {
                        status: response.status,
                        session_token: response.session_token().map(str::to_string),
                        body: response.body,
                        continuation: continuation.serialize()?,
                        is_done: continuation.is_done(),
                    });
                }
                Err(DriverError::RequestFailed {
                    status,
                    sub_status,
                    diagnostics,
                }) => {
                    let can_repair = split_repairs < self.config.retry.max_partition_gone_retries;
                    if can_repair
                        && continuation
                            .should_retry_on_split(
                                self.partitions.as_ref(),
                                status,
                                sub_status,
                                cancellation,
                            )
                            .await?
                    {
                        split_repairs += 1;
                        event!(
                            Level::DEBUG,
                            container = %continuation.container_id(),
                            split_repairs,
                            "retrying page after split"
                        );
                        continue;
                    }
                    return Err(DriverError::RequestFailed {
                        status,
                        sub_status,
                        diagnostics,
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}
