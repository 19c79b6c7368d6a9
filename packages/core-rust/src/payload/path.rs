//! Path convention: credentials and identifying fields are URL segments.
//!
//! Credentials never appear in a radio request body. Required fields are
//! validated here so a malformed call fails before it is queued.

use serde_json::{Map, Value};

use super::{join_url, ResolveContext, ResolveError, WireRequest, APPLICATION_JSON};
use crate::catalogue::OperationDescriptor;
use crate::shaping::PathRoute;

pub(super) fn resolve(
    descriptor: &OperationDescriptor,
    route: PathRoute,
    args: &[Value],
    ctx: &ResolveContext<'_>,
) -> Result<WireRequest, ResolveError> {
    let mut segments: Vec<String> = Vec::new();
    let mut body: Option<Value> = None;
    let mut authorization: Option<String> = None;

    if route != PathRoute::ServerSubscriptionFromIp {
        let credentials = ctx.require_credentials(descriptor.service)?;
        segments.push(credentials.id.clone());
        segments.push(credentials.key.clone());
    }

    match route {
        PathRoute::CommunityChannels
        | PathRoute::ConnectedUsers
        | PathRoute::ServerSubscriptionFromIp => {}
        PathRoute::ConnectedUser => {
            let room = room_id(args.first())?.ok_or(ResolveError::MissingField { field: "roomId" })?;
            segments.push(room.to_string());
            segments.push(identity(args.get(1))?);
        }
        PathRoute::SetUserChannels => {
            let call = ChannelCall::from_args(args);
            let room = match room_id(call.room)? {
                Some(room) => Some(room),
                None => room_id(
                    call.options
                        .and_then(|o| o.get("roomId").or_else(|| o.get("roomID"))),
                )?,
            }
            .or(ctx.default_room_id)
            .ok_or(ResolveError::MissingField { field: "roomId" })?;
            segments.push(room.to_string());
            segments.push(identity(call.identity)?);

            let mut channels = Map::new();
            if let Some(options) = call.options {
                for key in ["transmit", "scan"] {
                    if let Some(value) = options.get(key).filter(|v| !v.is_null()) {
                        channels.insert(key.to_string(), value.clone());
                    }
                }
            }
            body = Some(Value::Object(channels));
        }
        PathRoute::SetUserDisplayName => {
            let acc_id = required(args.first(), "accId")?;
            let display_name = required(args.get(1), "displayName")?;
            body = Some(object([("accId", acc_id), ("displayName", display_name)]));
        }
        PathRoute::SetServerIp => {
            let push_url = required(args.first(), "pushUrl")?;
            body = Some(object([("pushUrl", push_url)]));
        }
        PathRoute::SpeakerLocations => {
            let locations = match args.first() {
                Some(list @ Value::Array(_)) => list.clone(),
                None | Some(Value::Null) => {
                    return Err(ResolveError::MissingField { field: "locations" })
                }
                Some(_) => {
                    return Err(ResolveError::InvalidField {
                        field: "locations",
                        reason: "expected a list".to_string(),
                    })
                }
            };
            let token = match args.get(1) {
                Some(Value::String(token)) if !token.is_empty() => token.clone(),
                _ => ctx.require_credentials(descriptor.service)?.key.clone(),
            };
            authorization = Some(format!("Bearer {token}"));
            body = Some(object([("locations", locations)]));
        }
    }

    let mut headers = vec![("Accept".to_string(), APPLICATION_JSON.to_string())];
    headers.extend(ctx.headers.iter().cloned());
    if body.is_some() {
        headers.push(("Content-Type".to_string(), APPLICATION_JSON.to_string()));
    }
    if let Some(authorization) = authorization {
        headers.push(("Authorization".to_string(), authorization));
    }

    Ok(WireRequest {
        method: descriptor.method,
        url: join_url(
            ctx.base_url,
            descriptor.path,
            segments.iter().map(String::as_str),
        )?,
        headers,
        body,
    })
}

/// Arguments of a channel update, in either accepted form:
/// `(identity, options)` or `(roomId, identity, options)`.
struct ChannelCall<'a> {
    room: Option<&'a Value>,
    identity: Option<&'a Value>,
    options: Option<&'a Map<String, Value>>,
}

impl<'a> ChannelCall<'a> {
    fn from_args(args: &'a [Value]) -> Self {
        let leading_room = args.len() >= 3
            || matches!(args.get(1), Some(Value::String(_) | Value::Number(_)));
        if leading_room {
            Self {
                room: args.first(),
                identity: args.get(1),
                options: args.get(2).and_then(Value::as_object),
            }
        } else {
            Self {
                room: None,
                identity: args.first(),
                options: args.get(1).and_then(Value::as_object),
            }
        }
    }
}

/// Coerces a room id from a number or a numeric string.
fn room_id(value: Option<&Value>) -> Result<Option<u64>, ResolveError> {
    let invalid = |reason: &str| ResolveError::InvalidField {
        field: "roomId",
        reason: reason.to_string(),
    };
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid("expected a non-negative integer")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| invalid("not a number")),
        Some(_) => Err(invalid("expected a number")),
    }
}

fn identity(value: Option<&Value>) -> Result<String, ResolveError> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        None | Some(Value::Null | Value::String(_)) => {
            Err(ResolveError::MissingField { field: "identity" })
        }
        Some(_) => Err(ResolveError::InvalidField {
            field: "identity",
            reason: "expected a string".to_string(),
        }),
    }
}

/// A present, non-empty argument.
fn required(value: Option<&Value>, field: &'static str) -> Result<Value, ResolveError> {
    match value {
        None | Some(Value::Null) => Err(ResolveError::MissingField { field }),
        Some(Value::String(s)) if s.is_empty() => Err(ResolveError::MissingField { field }),
        Some(v) => Ok(v.clone()),
    }
}

fn object<const N: usize>(fields: [(&str, Value); N]) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}
