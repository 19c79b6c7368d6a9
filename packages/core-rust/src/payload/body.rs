//! Body convention: credentials and shaped data travel in a JSON body.

use serde_json::{Map, Value};

use super::{join_url, ResolveContext, ResolveError, WireRequest, APPLICATION_JSON};
use crate::catalogue::OperationDescriptor;
use crate::shaping::{batch, Shaping};

/// Shaped body content before credentials are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedBody {
    pub internal_key: Option<Value>,
    pub data: Value,
}

/// Applies `strategy` to `args`.
///
/// Path strategies are not meaningful here and produce an empty batch.
#[must_use]
pub fn shape(strategy: Shaping, args: &[Value]) -> ShapedBody {
    let data = match strategy {
        Shaping::Batch(layout) => batch(layout.apply(args)),
        Shaping::Verbatim(layout) => layout.apply(args).unwrap_or(Value::Null),
        Shaping::FirstArgument => match args.first() {
            Some(first) if !first.is_null() => Value::Array(vec![first.clone()]),
            _ => Value::Array(Vec::new()),
        },
        Shaping::Membership => return membership(args),
        Shaping::Empty | Shaping::Path(_) => Value::Array(Vec::new()),
    };
    ShapedBody {
        internal_key: None,
        data,
    }
}

/// Community join/leave shaping.
///
/// Accepts either one `{internalKey, accounts}` object or the positional pair
/// `(internalKey, accounts)`.
fn membership(args: &[Value]) -> ShapedBody {
    let (internal_key, accounts) = match args {
        [Value::Object(payload)]
            if payload.contains_key("accounts") || payload.contains_key("internalKey") =>
        {
            (
                payload.get("internalKey").cloned(),
                payload.get("accounts").cloned(),
            )
        }
        _ => (args.first().cloned(), args.get(1).cloned()),
    };

    // Only sequence entries are coerced; a lone account must already be a
    // string or an `{account}` object.
    let entries = match accounts {
        Some(Value::Array(items)) => items.into_iter().map(account_entry).collect(),
        Some(Value::String(account)) if !account.is_empty() => vec![account_object(account)],
        Some(single) if single.get("account").is_some() => vec![single],
        _ => Vec::new(),
    };

    ShapedBody {
        internal_key: internal_key.filter(|k| !k.is_null()),
        data: Value::Array(entries),
    }
}

fn account_entry(entry: Value) -> Value {
    if entry.get("account").is_some() {
        return entry;
    }
    account_object(match entry {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn account_object(account: String) -> Value {
    let mut object = Map::new();
    object.insert("account".to_string(), Value::String(account));
    Value::Object(object)
}

pub(super) fn resolve(
    descriptor: &OperationDescriptor,
    strategy: Shaping,
    args: &[Value],
    ctx: &ResolveContext<'_>,
) -> Result<WireRequest, ResolveError> {
    let credentials = ctx.require_credentials(descriptor.service)?;
    let shaped = shape(strategy, args);

    let mut body = Map::new();
    body.insert("id".to_string(), Value::String(credentials.id.clone()));
    body.insert("key".to_string(), Value::String(credentials.key.clone()));
    if let Some(internal_key) = shaped.internal_key {
        body.insert("internalKey".to_string(), internal_key);
    }
    body.insert("data".to_string(), shaped.data);

    let mut headers = vec![
        ("Accept".to_string(), APPLICATION_JSON.to_string()),
        ("Content-Type".to_string(), APPLICATION_JSON.to_string()),
    ];
    headers.extend(ctx.headers.iter().cloned());

    Ok(WireRequest {
        method: descriptor.method,
        url: join_url(ctx.base_url, descriptor.path, [])?,
        headers,
        body: Some(Value::Object(body)),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;

    use super::*;
    use crate::catalogue::{find, find_for, Method};
    use crate::payload::resolve as resolve_request;
    use crate::service::{Credentials, Service};

    fn resolve_with(name: &str, args: &[Value]) -> WireRequest {
        let base = Url::parse("https://api.sonorancad.com").unwrap();
        let creds = Credentials::new("community", "secret");
        let headers = vec![("X-Trace".to_string(), "1".to_string())];
        let mut ctx = ResolveContext::new(&base, Some(&creds));
        ctx.headers = &headers;
        resolve_request(find(name).unwrap(), args, &ctx).unwrap()
    }

    #[test]
    fn get_account_wraps_named_fields_in_batch() {
        let request = resolve_with("GET_ACCOUNT", &[json!("abc"), Value::Null]);
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url.as_str(), "https://api.sonorancad.com/general/get_account");
        assert_eq!(
            request.body,
            Some(json!({"id": "community", "key": "secret", "data": [{"apiId": "abc"}]}))
        );
        assert_eq!(request.header("content-type"), Some(APPLICATION_JSON));
        assert_eq!(request.header("x-trace"), Some("1"));
    }

    #[test]
    fn body_fields_are_ordered() {
        let request = resolve_with("GET_SERVERS", &[]);
        let body = request.body.unwrap();
        let keys: Vec<_> = body.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["id", "key", "data"]);
        assert_eq!(body["data"], json!([]));
    }

    #[test]
    fn first_argument_strategy() {
        let record = json!({"recordTypeId": 2});
        let request = resolve_with("NEW_RECORD", &[record.clone(), json!("ignored")]);
        assert_eq!(request.body.unwrap()["data"], json!([record]));

        let empty = resolve_with("NEW_RECORD", &[]);
        assert_eq!(empty.body.unwrap()["data"], json!([]));
    }

    #[test]
    fn verbatim_strategies_skip_batch_wrapping() {
        let servers = resolve_with("SET_SERVERS", &[json!([{"id": 1}]), json!(true)]);
        assert_eq!(servers.body.unwrap()["data"], json!([[{"id": 1}], true]));

        let signs = resolve_with("AUTH_STREETSIGNS", &[json!(3)]);
        assert_eq!(signs.body.unwrap()["data"], json!([3]));

        let games = shape(Shaping::Verbatim(crate::shaping::ArgLayout::FirstOrEmptyArray), &[]);
        assert_eq!(games.data, json!([]));
    }

    #[test]
    fn lone_object_used_verbatim() {
        let note = json!({"serverId": 1, "callId": 4, "note": "hi"});
        let request = resolve_with("ADD_CALL_NOTE", &[note.clone()]);
        assert_eq!(request.body.unwrap()["data"], json!([note]));
    }

    #[test]
    fn membership_from_payload_object() {
        let request = resolve_with(
            "JOIN_COMMUNITY",
            &[json!({"internalKey": "ik", "accounts": ["a", {"account": "b", "x": 1}, 7]})],
        );
        let body = request.body.unwrap();
        assert_eq!(body["internalKey"], json!("ik"));
        assert_eq!(
            body["data"],
            json!([{"account": "a"}, {"account": "b", "x": 1}, {"account": "7"}])
        );
    }

    #[test]
    fn membership_from_positional_pair() {
        let shaped = shape(Shaping::Membership, &[Value::Null, json!("solo")]);
        assert_eq!(shaped.internal_key, None);
        assert_eq!(shaped.data, json!([{"account": "solo"}]));

        let empty = shape(Shaping::Membership, &[]);
        assert_eq!(empty.data, json!([]));
    }

    #[test]
    fn lone_membership_account_must_be_string_or_account_object() {
        for lone in [json!(7), json!(true), json!({"name": "x"}), json!("")] {
            let shaped = shape(Shaping::Membership, &[json!("ik"), lone]);
            assert_eq!(shaped.internal_key, Some(json!("ik")));
            assert_eq!(shaped.data, json!([]));
        }

        let object = shape(Shaping::Membership, &[json!("ik"), json!({"account": "a"})]);
        assert_eq!(object.data, json!([{"account": "a"}]));

        let listed = shape(Shaping::Membership, &[json!("ik"), json!([7])]);
        assert_eq!(listed.data, json!([{"account": "7"}]));
    }

    #[test]
    fn default_rule_with_no_arguments_sends_empty_batch() {
        for name in ["GET_ACCOUNT", "REMOVE_RECORD", "GET_TEMPLATES", "GET_BLIPS"] {
            let request = resolve_with(name, &[]);
            assert_eq!(request.body.unwrap()["data"], json!([]), "{name}");
        }
        let explicit = resolve_with("GET_COM_ACCOUNT", &[]);
        assert_eq!(explicit.body.unwrap()["data"], json!([{}]));
    }

    #[test]
    fn cms_lookup_uses_cms_row() {
        let base = Url::parse("https://api.sonorancms.com").unwrap();
        let creds = Credentials::new("c", "k");
        let ctx = ResolveContext::new(&base, Some(&creds));
        let row = find_for(Service::Cms, "LOOKUP").unwrap();
        let request = resolve_request(row, &[json!({"uuid": "u"})], &ctx).unwrap();
        assert_eq!(request.url.as_str(), "https://api.sonorancms.com/communities/lookup");
        assert_eq!(request.body.unwrap()["data"], json!([{"uuid": "u"}]));
    }
}
