use std::io;

use quay_codec::Value;

use crate::{WireError, kind};

/// A decoded protocol message.
///
/// Field order within each variant is the wire order of the body's value
/// frames. Trailing bytes after the last expected field are ignored, the
/// way the original peers behave.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Error {
        message: String,
    },
    Heartbeat,
    RegisterRequest {
        slots: Vec<String>,
    },
    HubRegisterResponse {
        port: u16,
    },
    /// Reserved kind: carried for wire compatibility, never originated.
    DockRegisterResponse {
        slot: String,
    },
    ImportRequest {
        slots: Vec<String>,
    },
    ImportResponse {
        docks: Vec<String>,
    },
    QueryRequest {
        slot: String,
    },
    QueryResponse {
        dock_addr: String,
    },
    RpcRequest {
        index: i64,
        slot: String,
        method: String,
        args: Vec<Value>,
        want_result: bool,
    },
    RpcResponse {
        index: i64,
        slot: String,
        method: String,
        result: Vec<Value>,
        err: String,
    },
}

fn str_arr(items: &[String]) -> Value {
    Value::Arr(items.iter().map(|s| Value::from(s.as_str())).collect())
}

fn take_value(cursor: &mut &[u8]) -> Result<Value, WireError> {
    Ok(Value::decode(cursor)?)
}

fn take_str(cursor: &mut &[u8]) -> Result<String, WireError> {
    Ok(take_value(cursor)?.into_string()?)
}

fn take_str_arr(cursor: &mut &[u8]) -> Result<Vec<String>, WireError> {
    take_value(cursor)?
        .into_arr()?
        .into_iter()
        .map(|v| v.into_string().map_err(WireError::from))
        .collect()
}

fn take_i64(cursor: &mut &[u8]) -> Result<i64, WireError> {
    Ok(take_value(cursor)?.as_i64()?)
}

fn take_bool(cursor: &mut &[u8]) -> Result<bool, WireError> {
    Ok(take_value(cursor)?.as_bool()?)
}

impl Packet {
    /// The kind word this packet travels under.
    pub fn kind(&self) -> u32 {
        match self {
            Packet::Error { .. } => kind::ERROR,
            Packet::Heartbeat => kind::HEARTBEAT,
            Packet::RegisterRequest { .. } => kind::REGISTER_REQUEST,
            Packet::HubRegisterResponse { .. } => kind::HUB_REGISTER_RESPONSE,
            Packet::DockRegisterResponse { .. } => kind::DOCK_REGISTER_RESPONSE,
            Packet::ImportRequest { .. } => kind::IMPORT_REQUEST,
            Packet::ImportResponse { .. } => kind::IMPORT_RESPONSE,
            Packet::QueryRequest { .. } => kind::QUERY_REQUEST,
            Packet::QueryResponse { .. } => kind::QUERY_RESPONSE,
            Packet::RpcRequest { .. } => kind::RPC_REQUEST,
            Packet::RpcResponse { .. } => kind::RPC_RESPONSE,
        }
    }

    /// Writes the body's value frames in wire order.
    ///
    /// The registration port travels as I64: the original encodes a
    /// machine-word integer there.
    pub fn encode_body(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        match self {
            Packet::Error { message } => Value::from(message.as_str()).encode(buf),
            Packet::Heartbeat => Ok(()),
            Packet::RegisterRequest { slots } => str_arr(slots).encode(buf),
            Packet::HubRegisterResponse { port } => Value::I64(*port as i64).encode(buf),
            Packet::DockRegisterResponse { slot } => Value::from(slot.as_str()).encode(buf),
            Packet::ImportRequest { slots } => str_arr(slots).encode(buf),
            Packet::ImportResponse { docks } => str_arr(docks).encode(buf),
            Packet::QueryRequest { slot } => Value::from(slot.as_str()).encode(buf),
            Packet::QueryResponse { dock_addr } => Value::from(dock_addr.as_str()).encode(buf),
            Packet::RpcRequest {
                index,
                slot,
                method,
                args,
                want_result,
            } => {
                Value::I64(*index).encode(buf)?;
                Value::from(slot.as_str()).encode(buf)?;
                Value::from(method.as_str()).encode(buf)?;
                Value::Arr(args.clone()).encode(buf)?;
                Value::Bool(*want_result).encode(buf)
            }
            Packet::RpcResponse {
                index,
                slot,
                method,
                result,
                err,
            } => {
                Value::I64(*index).encode(buf)?;
                Value::from(slot.as_str()).encode(buf)?;
                Value::from(method.as_str()).encode(buf)?;
                Value::Arr(result.clone()).encode(buf)?;
                Value::from(err.as_str()).encode(buf)
            }
        }
    }

    /// Parses a body for the given kind word.
    pub fn decode_body(kind: u32, body: &[u8]) -> Result<Packet, WireError> {
        let mut remaining = body;
        let cursor = &mut remaining;
        match kind {
            kind::ERROR => Ok(Packet::Error {
                message: take_str(cursor)?,
            }),
            kind::HEARTBEAT => Ok(Packet::Heartbeat),
            kind::REGISTER_REQUEST => Ok(Packet::RegisterRequest {
                slots: take_str_arr(cursor)?,
            }),
            kind::HUB_REGISTER_RESPONSE => {
                let port = take_i64(cursor)?;
                let port = u16::try_from(port).map_err(|_| {
                    WireError::Malformed(format!("registration port {port} out of range"))
                })?;
                Ok(Packet::HubRegisterResponse { port })
            }
            kind::DOCK_REGISTER_RESPONSE => Ok(Packet::DockRegisterResponse {
                slot: take_str(cursor)?,
            }),
            kind::IMPORT_REQUEST => Ok(Packet::ImportRequest {
                slots: take_str_arr(cursor)?,
            }),
            kind::IMPORT_RESPONSE => Ok(Packet::ImportResponse {
                docks: take_str_arr(cursor)?,
            }),
            kind::QUERY_REQUEST => Ok(Packet::QueryRequest {
                slot: take_str(cursor)?,
            }),
            kind::QUERY_RESPONSE => Ok(Packet::QueryResponse {
                dock_addr: take_str(cursor)?,
            }),
            kind::RPC_REQUEST => Ok(Packet::RpcRequest {
                index: take_i64(cursor)?,
                slot: take_str(cursor)?,
                method: take_str(cursor)?,
                args: take_value(cursor)?.into_arr()?,
                want_result: take_bool(cursor)?,
            }),
            kind::RPC_RESPONSE => Ok(Packet::RpcResponse {
                index: take_i64(cursor)?,
                slot: take_str(cursor)?,
                method: take_str(cursor)?,
                result: take_value(cursor)?.into_arr()?,
                err: take_str(cursor)?,
            }),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_codec::tag;

    fn round_trip(packet: Packet) {
        let mut body = Vec::new();
        packet.encode_body(&mut body).expect("encode");
        let decoded = Packet::decode_body(packet.kind(), &body).expect("decode");
        assert_eq!(decoded, packet);
    }

    #[test]
    fn every_kind_round_trips() {
        round_trip(Packet::Error {
            message: "boom".into(),
        });
        round_trip(Packet::Heartbeat);
        round_trip(Packet::RegisterRequest {
            slots: vec!["IMath".into(), "IGame".into()],
        });
        round_trip(Packet::HubRegisterResponse { port: 30001 });
        round_trip(Packet::DockRegisterResponse {
            slot: "IMath".into(),
        });
        round_trip(Packet::ImportRequest {
            slots: vec!["IGame".into()],
        });
        round_trip(Packet::ImportResponse {
            docks: vec!["127.0.0.1:30001".into(), String::new()],
        });
        round_trip(Packet::QueryRequest {
            slot: "IMath".into(),
        });
        round_trip(Packet::QueryResponse {
            dock_addr: "127.0.0.1:30001".into(),
        });
        round_trip(Packet::RpcRequest {
            index: 7,
            slot: "IMath".into(),
            method: "add".into(),
            args: vec![Value::I32(2), Value::I32(3)],
            want_result: true,
        });
        round_trip(Packet::RpcResponse {
            index: 7,
            slot: "IMath".into(),
            method: "add".into(),
            result: vec![Value::I32(5)],
            err: String::new(),
        });
    }

    #[test]
    fn rpc_request_body_layout() {
        let packet = Packet::RpcRequest {
            index: 1,
            slot: "S".into(),
            method: "m".into(),
            args: vec![],
            want_result: false,
        };
        let mut body = Vec::new();
        packet.encode_body(&mut body).unwrap();

        let expect = [
            // index as I64(1)
            tag::I64,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            1,
            // slot "S"
            tag::STR32,
            0,
            0,
            0,
            1,
            b'S',
            // method "m"
            tag::STR32,
            0,
            0,
            0,
            1,
            b'm',
            // empty args array
            tag::ARR32,
            0,
            0,
            0,
            0,
            // want_result = false
            tag::FALSE,
        ];
        assert_eq!(body, expect);
    }

    #[test]
    fn heartbeat_has_an_empty_body() {
        let mut body = Vec::new();
        Packet::Heartbeat.encode_body(&mut body).unwrap();
        assert!(body.is_empty());
        assert_eq!(
            Packet::decode_body(kind::HEARTBEAT, &[]).unwrap(),
            Packet::Heartbeat
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(matches!(
            Packet::decode_body(99, &[]),
            Err(WireError::UnknownKind(99))
        ));
    }

    #[test]
    fn out_of_range_port_is_malformed() {
        let mut body = Vec::new();
        Value::I64(70_000).encode(&mut body).unwrap();
        assert!(matches!(
            Packet::decode_body(kind::HUB_REGISTER_RESPONSE, &body),
            Err(WireError::Malformed(_))
        ));
    }

    #[test]
    fn wrong_field_variant_is_a_body_error() {
        // QueryRequest whose body is an integer rather than a string.
        let mut body = Vec::new();
        Value::I64(3).encode(&mut body).unwrap();
        assert!(matches!(
            Packet::decode_body(kind::QUERY_REQUEST, &body),
            Err(WireError::Body(_))
        ));
    }

    #[test]
    fn truncated_body_is_an_io_error() {
        let mut body = Vec::new();
        Packet::QueryRequest {
            slot: "IMath".into(),
        }
        .encode_body(&mut body)
        .unwrap();
        assert!(matches!(
            Packet::decode_body(kind::QUERY_REQUEST, &body[..body.len() - 1]),
            Err(WireError::Codec(_))
        ));
    }
}
