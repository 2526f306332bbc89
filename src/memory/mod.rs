//! 记忆层：单次运行内的对话历史（不跨进程持久化）

pub mod conversation;

pub use conversation::{new_call_id, ConversationHistory, Message, ModelResponse, Part};
