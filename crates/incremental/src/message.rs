//! Pull protocol messages.
//!
//! A view that wants a source's current contents sends a `PullRequest`
//! upstream. The source answers with a batch tagged by a `PullReply`, which
//! streams deliver only to the listeners that asked.

use zql_index::Order;

/// Logical timestamp of one committed transaction.
pub type Version = u64;

/// Identifier of a pull request, unique per `Materialite`.
pub type RequestId = u64;

/// What kind of query issued a pull.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Row selection (tree views)
    Select,
    /// `count()`
    Count,
    /// `sum()`
    Sum,
    /// `average()`
    Average,
}

/// Request for historical data, flowing upstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullRequest {
    /// Request identifier, echoed by the reply
    pub id: RequestId,
    /// Ordering the requester keeps its results in, if any
    pub order: Option<Vec<(String, Order)>>,
    /// Kind of query that issued the request
    pub query_kind: Option<QueryKind>,
}

impl PullRequest {
    /// Creates a request with no ordering or query kind.
    pub fn new(id: RequestId) -> Self {
        Self {
            id,
            order: None,
            query_kind: None,
        }
    }

    /// Sets the requester's ordering.
    pub fn with_order(mut self, order: Vec<(String, Order)>) -> Self {
        self.order = Some(order);
        self
    }

    /// Sets the requester's query kind.
    pub fn with_query_kind(mut self, kind: QueryKind) -> Self {
        self.query_kind = Some(kind);
        self
    }

    /// Builds the reply tag for this request.
    pub fn reply(&self) -> PullReply {
        PullReply {
            replying_to: self.id,
        }
    }
}

/// Tag attached to a batch answering a `PullRequest`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PullReply {
    /// Id of the request being answered
    pub replying_to: RequestId,
}
