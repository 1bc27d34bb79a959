use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};
use std::collections::HashSet;
use tracing::debug;

use super::payload::Payload;
use crate::error::{RedfishError, Result};

/// Walks the members of a collection in order, following
/// `Members@odata.nextLink` across pages.
#[derive(Debug, Clone)]
pub struct CollectionWalker {
    collection: Payload,
}

struct WalkState {
    page: Payload,
    index: usize,
    visited: HashSet<String>,
}

impl CollectionWalker {
    pub fn new(collection: Payload) -> Result<Self> {
        if !collection.is_collection() {
            return Err(RedfishError::TypeError(
                "payload is not a collection".to_string(),
            ));
        }
        Ok(Self { collection })
    }

    pub fn collection(&self) -> &Payload {
        &self.collection
    }

    /// A fresh sequence over every member, starting from the first page.
    /// The first error ends the sequence.
    pub fn iter(&self) -> impl Stream<Item = Result<Payload>> {
        let state = WalkState {
            page: self.collection.clone(),
            index: 0,
            visited: HashSet::new(),
        };
        stream::try_unfold(state, next_member)
    }

    pub async fn collect(&self) -> Result<Vec<Payload>> {
        self.iter().try_collect().await
    }

    /// Resolves the members of the first page with up to `concurrency`
    /// requests in flight, keeping member order.
    pub async fn fetch_page(&self, concurrency: usize) -> Result<Vec<Payload>> {
        let size = self.collection.collection_size()?;
        stream::iter(0..size)
            .map(|index| self.collection.get_index(index))
            .buffered(concurrency.max(1))
            .try_collect()
            .await
    }
}

async fn next_member(mut state: WalkState) -> Result<Option<(Payload, WalkState)>> {
    let service = state.page.service()?;
    loop {
        if state.index < state.page.collection_size()? {
            let member = state.page.get_index(state.index).await?;
            state.index += 1;
            return Ok(Some((member, state)));
        }

        let Some(raw) = state.page.next_link() else {
            return Ok(None);
        };
        // Relative links are relative to the page that carried them.
        let link = match state.page.origin() {
            Some(base) => service.resolve_uri(base, raw)?,
            None => raw.to_string(),
        };
        if !state.visited.insert(link.clone()) {
            return Err(RedfishError::ProtocolError(format!(
                "Members@odata.nextLink {} revisited",
                link
            )));
        }
        debug!("Following Members@odata.nextLink {}", link);
        state.page = state.page.fetch_related(&link).await?;
        state.index = 0;
    }
}
