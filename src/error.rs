use std::fmt;

use crate::snapshot::NodeId;

/// Failure reported by a [`crate::client::GameClient`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// The accessor could not be reached or returned garbage.
    Unavailable(String),
    /// The accessor understood the command and refused it.
    Rejected(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "accessor unavailable: {reason}"),
            Self::Rejected(reason) => write!(f, "command rejected: {reason}"),
        }
    }
}

impl std::error::Error for CommandError {}

/// Failure while building or refreshing a state snapshot.
///
/// Fatal for the current decision; the engine never retries (the retry
/// policy belongs to whoever drives the bot).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchError {
    Client(CommandError),
    MalformedKey { raw: String },
    MissingField { node: NodeId, field: &'static str },
    AsymmetricEdge { a: NodeId, b: NodeId },
    UnknownNode { node: NodeId },
    InvalidOwner { node: NodeId, raw: i64 },
    InvalidPlayer { raw: i64 },
    ScoreShapeMismatch { nodes: usize, scores: usize },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(err) => write!(f, "state fetch failed: {err}"),
            Self::MalformedKey { raw } => write!(f, "unparseable node key in reply: {raw:?}"),
            Self::MissingField { node, field } => {
                write!(f, "reply is missing {field} for node {node}")
            }
            Self::AsymmetricEdge { a, b } => {
                write!(f, "adjacency is not symmetric: {a} lists {b}, but not vice versa")
            }
            Self::UnknownNode { node } => write!(f, "reply references unknown node {node}"),
            Self::InvalidOwner { node, raw } => {
                write!(f, "invalid owner value {raw} for node {node}")
            }
            Self::InvalidPlayer { raw } => write!(f, "invalid player id in reply: {raw}"),
            Self::ScoreShapeMismatch { nodes, scores } => write!(
                f,
                "strategic reply shape mismatch: {nodes} node ids, {scores} scores"
            ),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<CommandError> for FetchError {
    fn from(err: CommandError) -> Self {
        Self::Client(err)
    }
}
