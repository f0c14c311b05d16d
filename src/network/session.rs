//! Connection State Machine
//!
//! Per-connection protocol state on the server side. The machine is pure:
//! the reader task feeds it raw bytes and acts on the returned
//! [`SessionAction`]s, so every transition can be tested without sockets.

use crate::game::input::ControlCommand;
use crate::game::state::EntityId;
use crate::network::protocol::{decode_command, LineBuffer, ProtocolError};

/// Connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Accepted, nothing read yet.
    Pending,
    /// Waiting for the name line.
    Handshaking,
    /// Streaming control commands.
    Active,
    /// Terminal.
    Closed,
}

/// What the server should do after a read.
#[derive(Debug)]
pub enum SessionAction {
    /// Handshake complete: create the tank and send the reply.
    Join {
        /// Player name, surrounding whitespace trimmed
        name: String,
    },
    /// Latest command for this connection's tank.
    Command(ControlCommand),
    /// Protocol violation; drop the connection.
    Close(ProtocolError),
}

/// One client connection.
#[derive(Debug)]
pub struct Connection {
    id: EntityId,
    phase: ConnectionPhase,
    buffer: LineBuffer,
}

impl Connection {
    /// New connection with its transport-assigned id.
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            phase: ConnectionPhase::Pending,
            buffer: LineBuffer::new(),
        }
    }

    /// Connection id (also the tank id once joined).
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Current phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Whether the connection has reached its terminal phase.
    pub fn is_closed(&self) -> bool {
        self.phase == ConnectionPhase::Closed
    }

    /// Accept the connection and start waiting for the name.
    pub fn accept(&mut self) {
        if self.phase == ConnectionPhase::Pending {
            self.phase = ConnectionPhase::Handshaking;
        }
    }

    /// Transport failure in any phase.
    pub fn fail(&mut self) {
        self.phase = ConnectionPhase::Closed;
    }

    /// Process bytes from one read.
    ///
    /// Only complete lines are consumed. Processing stops at the first
    /// protocol violation, and nothing is emitted once closed. An
    /// unterminated line past the buffer limit closes the connection after
    /// the complete lines before it are handled.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if self.is_closed() {
            return actions;
        }

        self.accept();
        let overflow = self.buffer.push(bytes).err();

        while let Some(line) = self.buffer.next_line() {
            match self.phase {
                ConnectionPhase::Pending | ConnectionPhase::Handshaking => {
                    self.phase = ConnectionPhase::Active;
                    actions.push(SessionAction::Join {
                        name: line.trim().to_string(),
                    });
                }
                ConnectionPhase::Active => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match decode_command(&line) {
                        Ok(command) => actions.push(SessionAction::Command(command)),
                        Err(e) => {
                            self.phase = ConnectionPhase::Closed;
                            actions.push(SessionAction::Close(e));
                            break;
                        }
                    }
                }
                ConnectionPhase::Closed => break,
            }
        }

        if let Some(e) = overflow {
            if !self.is_closed() {
                self.phase = ConnectionPhase::Closed;
                actions.push(SessionAction::Close(e));
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vec2;
    use crate::game::input::{FireMode, Movement};
    use crate::network::protocol::MAX_LINE_LEN;

    const UP_CMD: &str = "{\"moving\":\"up\",\"fire\":\"none\",\"tdir\":{\"x\":0,\"y\":-1}}\n";

    #[test]
    fn test_accept_moves_to_handshaking() {
        let mut conn = Connection::new(3);
        assert_eq!(conn.phase(), ConnectionPhase::Pending);
        conn.accept();
        assert_eq!(conn.phase(), ConnectionPhase::Handshaking);
        assert_eq!(conn.id(), 3);
    }

    #[test]
    fn test_handshake_then_commands() {
        let mut conn = Connection::new(1);
        conn.accept();

        let actions = conn.feed(b"  alice \n");
        assert!(matches!(&actions[..], [SessionAction::Join { name }] if name == "alice"));
        assert_eq!(conn.phase(), ConnectionPhase::Active);

        let actions = conn.feed(UP_CMD.as_bytes());
        match &actions[..] {
            [SessionAction::Command(cmd)] => {
                assert_eq!(cmd.moving, Movement::Up);
                assert_eq!(cmd.fire, FireMode::None);
                assert_eq!(cmd.aim, Vec2::UP);
            }
            other => panic!("unexpected actions {:?}", other),
        }
    }

    #[test]
    fn test_empty_name_is_allowed() {
        let mut conn = Connection::new(1);
        conn.accept();
        let actions = conn.feed(b"\n");
        assert!(matches!(&actions[..], [SessionAction::Join { name }] if name.is_empty()));
    }

    #[test]
    fn test_split_reads_and_batched_lines() {
        let mut conn = Connection::new(1);
        conn.accept();

        assert!(conn.feed(b"bo").is_empty());
        assert_eq!(conn.phase(), ConnectionPhase::Handshaking);

        let mut batch = b"b\n".to_vec();
        batch.extend_from_slice(UP_CMD.as_bytes());
        batch.extend_from_slice(&UP_CMD.as_bytes()[..10]);

        let actions = conn.feed(&batch);
        assert_eq!(actions.len(), 2);
        assert!(matches!(&actions[0], SessionAction::Join { name } if name == "bob"));
        assert!(matches!(&actions[1], SessionAction::Command(_)));

        let actions = conn.feed(&UP_CMD.as_bytes()[10..]);
        assert!(matches!(&actions[..], [SessionAction::Command(_)]));
    }

    #[test]
    fn test_bad_command_closes_and_stops() {
        let mut conn = Connection::new(1);
        conn.accept();
        conn.feed(b"eve\n");

        let mut batch = b"{\"moving\":\"sideways\",\"fire\":\"none\",\"tdir\":{\"x\":0,\"y\":1}}\n".to_vec();
        batch.extend_from_slice(UP_CMD.as_bytes());

        let actions = conn.feed(&batch);
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], SessionAction::Close(ProtocolError::UnknownMovement(_))));
        assert!(conn.is_closed());

        assert!(conn.feed(UP_CMD.as_bytes()).is_empty());
    }

    #[test]
    fn test_arbitrary_read_boundaries() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut stream = b"carol\n".to_vec();
        for _ in 0..20 {
            stream.extend_from_slice(UP_CMD.as_bytes());
        }

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let mut conn = Connection::new(1);
            conn.accept();

            let mut actions = Vec::new();
            let mut rest = &stream[..];
            while !rest.is_empty() {
                let take = rng.gen_range(1..=rest.len().min(40));
                actions.extend(conn.feed(&rest[..take]));
                rest = &rest[take..];
            }

            assert_eq!(actions.len(), 21);
            assert!(matches!(&actions[0], SessionAction::Join { name } if name == "carol"));
            assert!(actions[1..].iter().all(|a| matches!(a, SessionAction::Command(_))));
        }
    }

    #[test]
    fn test_oversized_line_closes() {
        let mut conn = Connection::new(1);
        conn.accept();
        conn.feed(b"dave\n");

        let mut flood = UP_CMD.as_bytes().to_vec();
        flood.extend(std::iter::repeat(b'x').take(MAX_LINE_LEN + 1));

        let actions = conn.feed(&flood);
        assert_eq!(actions.len(), 2);
        assert!(matches!(&actions[0], SessionAction::Command(_)));
        assert!(matches!(&actions[1], SessionAction::Close(ProtocolError::LineTooLong { .. })));
        assert!(conn.is_closed());
    }

    #[test]
    fn test_transport_failure_is_terminal() {
        let mut conn = Connection::new(1);
        conn.fail();
        assert!(conn.is_closed());
        assert!(conn.feed(b"name\n").is_empty());

        conn.accept();
        assert_eq!(conn.phase(), ConnectionPhase::Closed);
    }
}
