use hive_proto::RequestBody;

/// A request to put on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub body: RequestBody,
    /// Routes the request to the shard owning this key.
    pub partition_key: Option<String>,
    /// When false the correlation stays open for a stream of replies.
    pub single_reply: bool,
}

impl RpcRequest {
    pub const fn new(body: RequestBody) -> Self {
        Self {
            body,
            partition_key: None,
            single_reply: true,
        }
    }

    #[must_use]
    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn streaming(mut self) -> Self {
        self.single_reply = false;
        self
    }
}
