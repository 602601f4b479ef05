//! Message definitions and the per-session registry.
//!
//! A definition fixes, for one message type, how instances travel: whether they need a
//! connection, whether they are retransmitted until confirmed, and whether they are applied
//! in order on a sequence channel. The registry is filled while the session is being set up
//! and is read-only afterwards.

use std::fmt;

use ackwire_core::{
    constants::{MAX_CHANNELS, MAX_DEFINITIONS},
    error::{ErrorKind, Result},
};

use crate::{dispatch::MessageContext, message::Message};

/// Application callback invoked for every delivered message of a type.
pub type MessageHandler = Box<dyn FnMut(&Message, &mut MessageContext<'_>)>;

/// Delivery semantics of a message type. Cheap to copy into every message instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MessageKind {
    message_type: u8,
    connectionless: bool,
    reliable: bool,
    sequenced: bool,
    channel: u8,
}

impl MessageKind {
    /// Unreliable, unsequenced, connection-bound message.
    pub const fn new(message_type: u8) -> Self {
        Self { message_type, connectionless: false, reliable: false, sequenced: false, channel: 0 }
    }

    /// Message that can be sent to and received from bare addresses.
    pub const fn connectionless(message_type: u8) -> Self {
        Self { message_type, connectionless: true, reliable: false, sequenced: false, channel: 0 }
    }

    /// Marks the kind as reliable.
    pub const fn reliable(mut self) -> Self {
        self.reliable = true;
        self
    }

    /// Marks the kind as sequenced on the given channel.
    pub const fn sequenced(mut self, channel: u8) -> Self {
        self.sequenced = true;
        self.channel = channel;
        self
    }

    /// Message type id.
    pub const fn message_type(&self) -> u8 {
        self.message_type
    }

    /// Returns true when the message needs no connection.
    pub const fn is_connectionless(&self) -> bool {
        self.connectionless
    }

    /// Returns true when the message is retransmitted until confirmed.
    pub const fn is_reliable(&self) -> bool {
        self.reliable
    }

    /// Returns true when the message is applied in order.
    pub const fn is_sequenced(&self) -> bool {
        self.sequenced
    }

    /// Returns true for reliable messages carrying a sequence id.
    pub const fn is_reliable_sequenced(&self) -> bool {
        self.reliable && self.sequenced
    }

    /// Sequence channel used when sequenced.
    pub const fn channel(&self) -> u8 {
        self.channel
    }

    /// Bytes of message header on the wire, excluding the size prefix.
    pub const fn header_size(&self) -> usize {
        let mut size = 1;
        if !self.connectionless {
            size += 1;
        }
        if self.reliable {
            size += 2;
            if self.sequenced {
                size += 2;
            }
        }
        size
    }

    fn validate(&self) -> Result<()> {
        if self.connectionless && self.reliable {
            return Err(ErrorKind::InvalidDefinition("connectionless messages cannot be reliable"));
        }
        if self.connectionless && self.sequenced {
            return Err(ErrorKind::InvalidDefinition("connectionless messages cannot be sequenced"));
        }
        if self.channel as usize >= MAX_CHANNELS {
            return Err(ErrorKind::InvalidDefinition("sequence channel out of range"));
        }
        Ok(())
    }
}

/// Describes one message type: its delivery semantics, a name and an optional handler.
pub struct MessageDefinition {
    kind: MessageKind,
    name: String,
    handler: Option<MessageHandler>,
}

impl MessageDefinition {
    /// Creates a definition without a handler; its messages are surfaced as events.
    pub fn new(name: impl Into<String>, kind: MessageKind) -> Self {
        Self { kind, name: name.into(), handler: None }
    }

    /// Attaches the callback invoked for every delivered message.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&Message, &mut MessageContext<'_>) + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Delivery semantics.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Human readable name, folded into the definition hash.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true when a handler is attached.
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for MessageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDefinition")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("handler", &self.handler.as_ref().map(|_| "<handler>"))
            .finish()
    }
}

/// Fixed table of definitions indexed by message type.
pub struct DefinitionRegistry {
    definitions: Box<[Option<MessageDefinition>]>,
    locked: bool,
}

impl DefinitionRegistry {
    /// Creates an empty, unlocked registry.
    pub fn new() -> Self {
        Self {
            definitions: (0..MAX_DEFINITIONS).map(|_| None).collect::<Vec<_>>().into_boxed_slice(),
            locked: false,
        }
    }

    /// Adds a definition. Fails once the registry is locked, for duplicate types, and for
    /// contradictory options.
    pub fn register(&mut self, definition: MessageDefinition) -> Result<()> {
        if self.locked {
            return Err(ErrorKind::RegistrationClosed);
        }
        definition.kind.validate()?;
        let slot = &mut self.definitions[definition.kind.message_type as usize];
        if slot.is_some() {
            return Err(ErrorKind::DuplicateDefinition(definition.kind.message_type));
        }
        *slot = Some(definition);
        Ok(())
    }

    /// Closes the registry for further registrations.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Returns true once `lock` was called.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns the definition for a type.
    pub fn get(&self, message_type: u8) -> Option<&MessageDefinition> {
        self.definitions[message_type as usize].as_ref()
    }

    /// Returns the delivery semantics for a type.
    pub fn kind(&self, message_type: u8) -> Option<MessageKind> {
        self.get(message_type).map(|definition| definition.kind)
    }

    /// Like `kind`, but unregistered types are an error.
    pub fn require_kind(&self, message_type: u8) -> Result<MessageKind> {
        self.kind(message_type).ok_or(ErrorKind::UnregisteredMessageType(message_type))
    }

    /// Returns the handler of a type, if any.
    pub fn handler_mut(&mut self, message_type: u8) -> Option<&mut MessageHandler> {
        self.definitions[message_type as usize].as_mut().and_then(|d| d.handler.as_mut())
    }

    /// Iterates over all registered definitions in type order.
    pub fn iter(&self) -> impl Iterator<Item = &MessageDefinition> {
        self.definitions.iter().flatten()
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// CRC-32 over every definition's type, flags, channel and name.
    ///
    /// Two sessions can only talk when they agree on this value.
    pub fn definition_hash(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for definition in self.iter() {
            let kind = definition.kind;
            let flags = u8::from(kind.connectionless)
                | u8::from(kind.reliable) << 1
                | u8::from(kind.sequenced) << 2;
            hasher.update(&[kind.message_type, flags, kind.channel]);
            hasher.update(definition.name.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize()
    }
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefinitionRegistry")
            .field("definitions", &self.iter().collect::<Vec<_>>())
            .field("locked", &self.locked)
            .finish()
    }
}
