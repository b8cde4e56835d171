//! Messages flowing through a pipeline and the capabilities stages ask for.
//!
//! A [`Message`] is a closed set of variants. Stages never inspect a
//! message's concrete shape directly when a capability will do: they ask
//! for its text ([`Stringify`]), whether it can be acknowledged
//! ([`Acknowledge`]), its ordered keys and values ([`KeyValue`]), or the
//! message it wraps ([`Unwrap`]). The probing helpers on [`Message`] look
//! through tracked wrappers so a tracked record still answers as a record.
//! A group answers as the batch it carries.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Text representation of a message
pub trait Stringify {
    fn stringify(&self) -> String;
}

/// Signal that a message was fully processed
pub trait Acknowledge {
    fn ack(&self);
}

/// Ordered key/value access, used for column-ordered output
pub trait KeyValue {
    /// Keys in their defined order
    fn keys(&self) -> Vec<&str>;

    /// Value stored under `key`
    fn value(&self, key: &str) -> Option<&Value>;

    /// Values in key order
    fn values(&self) -> Vec<&Value> {
        self.keys()
            .into_iter()
            .filter_map(|k| self.value(k))
            .collect()
    }
}

/// A message that wraps another message
pub trait Unwrap {
    fn inner(&self) -> Option<&Message>;
}

/// Unit of data moved between stages
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Bytes(Vec<u8>),
    Record(Record),
    /// Compound message emitted by batching stages, constituents in arrival order
    Batch(Vec<Message>),
    /// Compound message emitted per group name by grouping stages
    Group(GroupMessage),
    /// A message carrying an acknowledgement hook
    Tracked(Tracked),
}

impl Message {
    /// Wrap `msg` so that acknowledging it runs `on_ack`
    pub fn tracked<F>(msg: Message, on_ack: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Message::Tracked(Tracked {
            inner: Box::new(msg),
            on_ack: Arc::new(on_ack),
        })
    }

    /// Text of the message, looking through wrappers
    pub fn text(&self) -> String {
        self.stringify()
    }

    /// Length in bytes of the message's text form
    pub fn byte_len(&self) -> usize {
        match self {
            Message::Text(s) => s.len(),
            Message::Bytes(b) => b.len(),
            Message::Tracked(t) => t.inner.byte_len(),
            other => other.stringify().len(),
        }
    }

    /// Acknowledgement capability, if the message or anything it wraps has one
    pub fn acknowledger(&self) -> Option<&dyn Acknowledge> {
        match self {
            Message::Tracked(t) => Some(t),
            other => other.inner().and_then(Message::acknowledger),
        }
    }

    /// Key/value capability, if the message or anything it wraps has one
    pub fn key_value(&self) -> Option<&dyn KeyValue> {
        match self {
            Message::Record(r) => Some(r),
            other => other.inner().and_then(Message::key_value),
        }
    }

    /// Constituents of a compound message
    pub fn constituents(&self) -> Option<&[Message]> {
        match self {
            Message::Batch(items) => Some(items),
            Message::Group(g) => Some(&g.batch),
            Message::Tracked(t) => t.inner.constituents(),
            _ => None,
        }
    }
}

impl Stringify for Message {
    fn stringify(&self) -> String {
        match self {
            Message::Text(s) => s.clone(),
            Message::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Message::Record(r) => r.stringify(),
            Message::Batch(items) => join_lines(items),
            Message::Group(g) => join_lines(&g.batch),
            Message::Tracked(t) => t.inner.stringify(),
        }
    }
}

impl Unwrap for Message {
    fn inner(&self) -> Option<&Message> {
        match self {
            Message::Tracked(t) => Some(&t.inner),
            _ => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stringify())
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(s.to_string())
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(s)
    }
}

impl From<Vec<u8>> for Message {
    fn from(b: Vec<u8>) -> Self {
        Message::Bytes(b)
    }
}

impl From<Record> for Message {
    fn from(r: Record) -> Self {
        Message::Record(r)
    }
}

fn join_lines(items: &[Message]) -> String {
    items
        .iter()
        .map(Stringify::stringify)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Batch of messages collected under one group name
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMessage {
    pub name: String,
    pub batch: Vec<Message>,
}

impl GroupMessage {
    pub fn new(name: impl Into<String>, batch: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            batch,
        }
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Message paired with the hook that acknowledges it upstream
#[derive(Clone)]
pub struct Tracked {
    inner: Box<Message>,
    on_ack: Arc<dyn Fn() + Send + Sync>,
}

impl Tracked {
    pub fn message(&self) -> &Message {
        &self.inner
    }

    pub fn into_message(self) -> Message {
        *self.inner
    }
}

impl Acknowledge for Tracked {
    fn ack(&self) {
        (self.on_ack)()
    }
}

impl fmt::Debug for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked").field("inner", &self.inner).finish()
    }
}

// Two tracked messages are equal when they carry equal payloads.
impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

/// Key/value record with a defined key order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, keeping its position if it already exists
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Builder form of [`Record::set`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Reorder fields so `order` comes first; unnamed keys keep their
    /// relative order after them
    pub fn with_key_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered = Vec::with_capacity(self.fields.len());
        for key in order {
            if let Some(pos) = self.fields.iter().position(|(k, _)| k == key.as_ref()) {
                ordered.push(self.fields.remove(pos));
            }
        }
        ordered.append(&mut self.fields);
        self.fields = ordered;
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl KeyValue for Record {
    fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(|(k, _)| k.as_str()).collect()
    }

    fn value(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

impl Stringify for Record {
    fn stringify(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k}={s}"),
                other => format!("{k}={other}"),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
