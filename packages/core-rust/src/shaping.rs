//! Shaping-strategy registry.
//!
//! [`shaping`] maps every [`Operation`] to the strategy that turns its
//! positional call arguments into a request payload. The match is exhaustive,
//! so a new operation does not compile until it is given a rule.

use serde_json::{Map, Value};
use uuid::{Uuid, Variant};

use crate::catalogue::Operation;

/// Account selector fields shared by most CMS account operations.
const ACCOUNT: &[&str] = &["apiId", "username", "accId", "discord", "uniqueId"];

// ---------------------------------------------------------------------------
// ArgLayout
// ---------------------------------------------------------------------------

/// How positional arguments become a single request value.
///
/// A `null` argument counts as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLayout {
    /// Always an empty object.
    EmptyObject,
    /// The first argument, unchanged.
    First,
    /// The first argument, or `{}` when absent.
    FirstOrEmptyObject,
    /// The first argument, or `[]` when absent.
    FirstOrEmptyArray,
    /// Every argument in order, as a sequence.
    Arguments,
    /// Arguments zipped with the field names; absent ones are omitted and
    /// no value at all is produced when every argument is absent.
    Fields(&'static [&'static str]),
    /// Like `Fields`, but always an object, possibly `{}`.
    Record(&'static [&'static str]),
    /// A lone object argument is used verbatim, otherwise `Record`.
    ObjectOrFields(&'static [&'static str]),
    /// A lone object argument keeps only `keys`, otherwise `Record(fields)`.
    PickOrFields {
        keys: &'static [&'static str],
        fields: &'static [&'static str],
    },
    /// `ObjectOrFields`, except a positional `units` argument is sent as
    /// `units` when it is a sequence and as `account` when it is a string.
    UnitsOrAccount(&'static [&'static str]),
    /// `Record`, except `uuid_field` is kept only when it holds a v4 UUID.
    RecordWithUuid {
        fields: &'static [&'static str],
        uuid_field: &'static str,
    },
}

impl ArgLayout {
    /// Builds the request value, `None` meaning "no value supplied".
    #[must_use]
    pub fn apply(self, args: &[Value]) -> Option<Value> {
        let first = args.first().filter(|v| !v.is_null());
        let lone_object = first.filter(|v| v.is_object());
        match self {
            ArgLayout::EmptyObject => Some(Value::Object(Map::new())),
            ArgLayout::First => first.cloned(),
            ArgLayout::FirstOrEmptyObject => {
                Some(first.cloned().unwrap_or_else(|| Value::Object(Map::new())))
            }
            ArgLayout::FirstOrEmptyArray => {
                Some(first.cloned().unwrap_or_else(|| Value::Array(Vec::new())))
            }
            ArgLayout::Arguments => Some(Value::Array(args.to_vec())),
            ArgLayout::Fields(names) => {
                let object = zip_fields(names, args);
                (!object.is_empty()).then_some(Value::Object(object))
            }
            ArgLayout::Record(names) => Some(Value::Object(zip_fields(names, args))),
            ArgLayout::ObjectOrFields(names) => Some(
                lone_object
                    .cloned()
                    .unwrap_or_else(|| Value::Object(zip_fields(names, args))),
            ),
            ArgLayout::PickOrFields { keys, fields } => Some(match lone_object {
                Some(Value::Object(object)) => Value::Object(
                    keys.iter()
                        .filter_map(|key| {
                            let value = object.get(*key).filter(|v| !v.is_null())?;
                            Some(((*key).to_string(), value.clone()))
                        })
                        .collect(),
                ),
                _ => Value::Object(zip_fields(fields, args)),
            }),
            ArgLayout::UnitsOrAccount(names) => Some(
                lone_object
                    .cloned()
                    .unwrap_or_else(|| Value::Object(units_or_account(names, args))),
            ),
            ArgLayout::RecordWithUuid { fields, uuid_field } => {
                let mut object = zip_fields(fields, args);
                if object
                    .get(uuid_field)
                    .is_some_and(|value| !is_v4_uuid(value))
                {
                    object.remove(uuid_field);
                }
                Some(Value::Object(object))
            }
        }
    }
}

fn zip_fields(names: &[&str], args: &[Value]) -> Map<String, Value> {
    let mut object = Map::new();
    for (name, value) in names.iter().zip(args) {
        if !value.is_null() {
            object.insert((*name).to_string(), value.clone());
        }
    }
    object
}

fn units_or_account(names: &[&str], args: &[Value]) -> Map<String, Value> {
    let mut object = Map::new();
    for (name, value) in names.iter().zip(args) {
        match (*name, value) {
            ("units", Value::Array(_)) => {
                object.insert("units".to_string(), value.clone());
            }
            ("units", Value::String(_)) => {
                object.insert("account".to_string(), value.clone());
            }
            ("units", _) | (_, Value::Null) => {}
            (name, _) => {
                object.insert(name.to_string(), value.clone());
            }
        }
    }
    object
}

fn is_v4_uuid(value: &Value) -> bool {
    value
        .as_str()
        .and_then(|s| Uuid::try_parse(s).ok())
        .is_some_and(|id| id.get_version_num() == 4 && id.get_variant() == Variant::RFC4122)
}

/// Default batch rule: absent becomes `[]`, a sequence passes through and any
/// other value is wrapped in a one-element sequence.
#[must_use]
pub fn batch(value: Option<Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::Array(Vec::new()),
        Some(Value::Array(items)) => Value::Array(items),
        Some(other) => Value::Array(vec![other]),
    }
}

// ---------------------------------------------------------------------------
// Shaping
// ---------------------------------------------------------------------------

/// Path-convention route, one per radio operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRoute {
    CommunityChannels,
    ConnectedUsers,
    ConnectedUser,
    SetUserChannels,
    SetUserDisplayName,
    ServerSubscriptionFromIp,
    SetServerIp,
    SpeakerLocations,
}

/// Strategy used to shape an operation's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shaping {
    /// `data` follows the default batch rule applied to the layout's value.
    Batch(ArgLayout),
    /// `data` is the layout's value as-is.
    Verbatim(ArgLayout),
    /// `data` is a one-element sequence holding the first argument.
    FirstArgument,
    /// `data` is always an empty sequence.
    Empty,
    /// Community join/leave: top-level `internalKey`, `data` is `[{account}]`.
    Membership,
    /// Path convention.
    Path(PathRoute),
}

/// Returns the shaping strategy for `operation`.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn shaping(operation: Operation) -> Shaping {
    use ArgLayout::{
        Arguments, EmptyObject, Fields, First, FirstOrEmptyArray, FirstOrEmptyObject,
        ObjectOrFields, PickOrFields, Record, RecordWithUuid, UnitsOrAccount,
    };
    use Shaping::{Batch, Empty, FirstArgument, Membership, Path, Verbatim};

    match operation {
        // ----- CAD general -----
        Operation::GetServers
        | Operation::GetVersion
        | Operation::GetDepartments
        | Operation::GetSubVersion
        | Operation::GetGameServers => Empty,
        Operation::SetServers | Operation::AuthStreetsigns => Verbatim(Arguments),
        Operation::SetPenalCodes
        | Operation::SetApiId
        | Operation::NewRecord
        | Operation::EditRecord
        | Operation::LookupInt
        | Operation::SetAccountPermissions
        | Operation::BanUser
        | Operation::SetPostals => FirstArgument,
        Operation::GetTemplates => Batch(Fields(&["recordTypeId"])),
        Operation::RemoveRecord | Operation::RemoveCharacter | Operation::RemoveBlip => {
            Batch(Fields(&["id"]))
        }
        Operation::Lookup | Operation::CommunityLookup => Batch(ObjectOrFields(&["id", "uuid"])),
        Operation::GetAccount => Batch(Fields(&["apiId", "username"])),
        Operation::CheckApiid | Operation::GetCharacters | Operation::GetIdentifiers => {
            Batch(Fields(&["apiId"]))
        }
        Operation::CheckComApiid => Batch(Record(&["apiId"])),
        Operation::ApplyPermissionKey => Batch(Fields(&["apiId", "permissionKey"])),
        Operation::VerifySecret => Batch(Record(&["secret"])),
        Operation::SendPhoto => Batch(Fields(&["apiId", "url"])),
        Operation::SetClock => Batch(ObjectOrFields(&[
            "serverId",
            "currentUtc",
            "currentGame",
            "secondsPerHour",
        ])),
        Operation::JoinCommunity | Operation::LeaveCommunity => Membership,

        // ----- CAD civilian -----
        Operation::NewCharacter | Operation::EditCharacter => FirstArgument,

        // ----- CAD emergency -----
        Operation::ModifyIdentifier
        | Operation::AddBlip
        | Operation::ModifyBlip
        | Operation::GetCalls
        | Operation::GetActiveUnits
        | Operation::NewDispatch
        | Operation::UnitLocation => FirstArgument,
        Operation::SetIdentifier => Batch(Fields(&["apiId", "identId"])),
        Operation::UnitPanic => Batch(PickOrFields {
            keys: &["apiId", "account", "isPanic"],
            fields: &["apiId", "isPanic"],
        }),
        Operation::UnitStatus => Batch(PickOrFields {
            keys: &["apiId", "account", "status", "serverId", "identIds"],
            fields: &["apiId", "status", "serverId", "identIds"],
        }),
        Operation::GetBlips => Batch(Fields(&["serverId"])),
        Operation::FullWhitelist => Batch(Record(&["serverId"])),
        Operation::Call911 => Batch(Fields(&[
            "serverId",
            "isEmergency",
            "caller",
            "location",
            "description",
            "metaData",
        ])),
        Operation::Remove911 => Batch(Fields(&["callId"])),
        Operation::KickUnit => Batch(Fields(&["apiId", "reason", "serverId"])),
        Operation::AttachUnit => Batch(UnitsOrAccount(&["serverId", "callId", "units", "identIds"])),
        Operation::DetachUnit => Batch(UnitsOrAccount(&["serverId", "units"])),
        Operation::SetCallPostal => Batch(Fields(&["serverId", "callId", "postal"])),
        Operation::SetCallPrimary => {
            Batch(Fields(&["serverId", "callId", "primary", "trackPrimary"]))
        }
        Operation::AddCallNote => Batch(ObjectOrFields(&["serverId", "callId", "note", "label"])),
        Operation::CloseCall => Batch(ObjectOrFields(&["serverId", "callId"])),
        Operation::SetStreetsignConfig => Batch(Fields(&["serverId", "signConfig"])),
        Operation::UpdateStreetsign => Batch(Fields(&["serverId", "signData"])),

        // ----- CMS general -----
        Operation::GetComAccount
        | Operation::GetCurrentClockIn
        | Operation::GetAccountRanks
        | Operation::KickAccount
        | Operation::BanAccount => Batch(Record(ACCOUNT)),
        Operation::GetAccounts => Batch(FirstOrEmptyObject),
        Operation::SetAccountRanks => Batch(Record(&[
            "accId", "set", "add", "remove", "apiId", "username", "discord", "uniqueId",
        ])),
        Operation::GetProfileFields => Batch(EmptyObject),
        Operation::ClockInOut => Batch(ObjectOrFields(&[
            "apiId",
            "accId",
            "forceClockIn",
            "discord",
            "uniqueId",
            "type",
            "forceClockOut",
        ])),
        Operation::EditAccProfileFields => Batch(Record(&[
            "apiId",
            "username",
            "accId",
            "discord",
            "uniqueId",
            "profileFields",
        ])),
        Operation::SetAccountName => Batch(Record(&[
            "apiId", "username", "accId", "discord", "uniqueId", "newName",
        ])),
        Operation::ForceSync => Batch(Record(&[
            "apiId",
            "username",
            "accId",
            "discordId",
            "uniqueId",
        ])),

        // ----- CMS servers, events, forms -----
        Operation::SetGameServers => Verbatim(FirstOrEmptyArray),
        Operation::VerifyWhitelist => Batch(RecordWithUuid {
            fields: &["apiId", "accId", "serverId", "discord"],
            uuid_field: "accId",
        }),
        Operation::Rsvp => Batch(Record(&["eventId", "apiId", "accId", "discord", "uniqueId"])),
        Operation::ChangeFormStage => Batch(Record(&[
            "accId",
            "formId",
            "newStageId",
            "apiId",
            "username",
            "discord",
            "uniqueId",
        ])),
        Operation::GetFormTemplateSubmissions => Batch(Record(&["templateId", "skip", "take"])),

        // ----- CMS ERLC -----
        Operation::ErlcGetOnlinePlayers | Operation::ErlcGetPlayerQueue => {
            Batch(Record(&["robloxJoinCode"]))
        }
        Operation::ErlcAddNewRecord => Batch(Record(&[
            "robloxJoinCode",
            "executerDiscordId",
            "type",
            "reason",
            "playerDiscordId",
            "playerRobloxId",
            "points",
        ])),

        // ----- Radio -----
        Operation::RadioGetCommunityChannels => Path(PathRoute::CommunityChannels),
        Operation::RadioGetConnectedUsers => Path(PathRoute::ConnectedUsers),
        Operation::RadioGetConnectedUser => Path(PathRoute::ConnectedUser),
        Operation::RadioSetUserChannels => Path(PathRoute::SetUserChannels),
        Operation::RadioSetUserDisplayName => Path(PathRoute::SetUserDisplayName),
        Operation::RadioGetServerSubscriptionFromIp => Path(PathRoute::ServerSubscriptionFromIp),
        Operation::RadioSetServerIp => Path(PathRoute::SetServerIp),
        Operation::RadioSetInGameSpeakerLocations => Path(PathRoute::SpeakerLocations),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::catalogue::CATALOGUE;
    use crate::service::{Convention, Service};

    #[test]
    fn batch_rule_edge_cases() {
        assert_eq!(batch(None), json!([]));
        assert_eq!(batch(Some(Value::Null)), json!([]));
        assert_eq!(batch(Some(json!([]))), json!([]));
        assert_eq!(batch(Some(json!({"a": 1}))), json!([{"a": 1}]));
        assert_eq!(batch(Some(json!([1, 2]))), json!([1, 2]));
        assert_eq!(batch(Some(json!("x"))), json!(["x"]));
    }

    #[test]
    fn fields_skip_absent_arguments() {
        let value = ArgLayout::Fields(&["apiId", "username"]).apply(&[json!("abc"), Value::Null]);
        assert_eq!(value, Some(json!({"apiId": "abc"})));

        let short = ArgLayout::Fields(&["a", "b", "c"]).apply(&[json!(1)]);
        assert_eq!(short, Some(json!({"a": 1})));
    }

    #[test]
    fn fields_without_arguments_produce_nothing() {
        let layout = ArgLayout::Fields(&["apiId", "username"]);
        assert_eq!(layout.apply(&[]), None);
        assert_eq!(layout.apply(&[Value::Null, Value::Null]), None);
        assert_eq!(batch(layout.apply(&[])), json!([]));

        assert_eq!(ArgLayout::Record(&["apiId"]).apply(&[]), Some(json!({})));
    }

    #[test]
    fn verify_whitelist_keeps_only_uuid_account_ids() {
        let layout = shaping(Operation::VerifyWhitelist);
        let Shaping::Batch(layout) = layout else {
            panic!("unexpected strategy {layout:?}");
        };
        let uuid = "3f2b8c1e-9a4d-4e6f-8b2a-1c3d5e7f9a0b";
        assert_eq!(
            layout.apply(&[json!("api"), json!(uuid), json!(1), json!("1234")]),
            Some(json!({"apiId": "api", "accId": uuid, "serverId": 1, "discord": "1234"}))
        );
        assert_eq!(
            layout.apply(&[json!("api"), json!("not-an-id"), json!(1), json!("1234")]),
            Some(json!({"apiId": "api", "serverId": 1, "discord": "1234"}))
        );
    }

    #[test]
    fn unit_assignment_sends_string_as_account() {
        let Shaping::Batch(attach) = shaping(Operation::AttachUnit) else {
            panic!("attach is batched");
        };
        assert_eq!(
            attach.apply(&[json!(1), json!(9), json!("acc"), json!([3])]),
            Some(json!({"serverId": 1, "callId": 9, "account": "acc", "identIds": [3]}))
        );
        assert_eq!(
            attach.apply(&[json!(1), json!(9), json!(["u1"])]),
            Some(json!({"serverId": 1, "callId": 9, "units": ["u1"]}))
        );

        let Shaping::Batch(detach) = shaping(Operation::DetachUnit) else {
            panic!("detach is batched");
        };
        assert_eq!(
            detach.apply(&[json!(1), json!("acc")]),
            Some(json!({"serverId": 1, "account": "acc"}))
        );
        assert_eq!(
            detach.apply(&[json!(1), json!(5)]),
            Some(json!({"serverId": 1}))
        );
        let object = json!({"serverId": 1, "units": ["u2"]});
        assert_eq!(detach.apply(&[object.clone()]), Some(object));
    }

    #[test]
    fn unit_status_and_panic_keep_known_keys() {
        let Shaping::Batch(status) = shaping(Operation::UnitStatus) else {
            panic!("status is batched");
        };
        assert_eq!(
            status.apply(&[json!({"account": "a", "status": 2, "serverId": 1, "extra": true})]),
            Some(json!({"account": "a", "status": 2, "serverId": 1}))
        );
        assert_eq!(
            status.apply(&[json!("api"), json!(2), json!(1)]),
            Some(json!({"apiId": "api", "status": 2, "serverId": 1}))
        );

        let Shaping::Batch(panic_layout) = shaping(Operation::UnitPanic) else {
            panic!("panic is batched");
        };
        assert_eq!(
            panic_layout.apply(&[json!({"apiId": "api", "isPanic": true, "note": "x"})]),
            Some(json!({"apiId": "api", "isPanic": true}))
        );
    }

    #[test]
    fn set_servers_sends_positional_arguments() {
        assert_eq!(shaping(Operation::SetServers), Shaping::Verbatim(ArgLayout::Arguments));
        assert_eq!(
            ArgLayout::Arguments.apply(&[json!([{"id": 1}]), json!(false)]),
            Some(json!([[{"id": 1}], false]))
        );
    }

    #[test]
    fn object_or_fields_prefers_lone_object() {
        let layout = ArgLayout::ObjectOrFields(&["serverId", "callId"]);
        let object = json!({"serverId": 1, "callId": 7, "extra": true});
        assert_eq!(layout.apply(&[object.clone()]), Some(object));
        assert_eq!(
            layout.apply(&[json!(1), json!(7)]),
            Some(json!({"serverId": 1, "callId": 7}))
        );
    }

    #[test]
    fn first_layouts_fill_defaults() {
        assert_eq!(ArgLayout::First.apply(&[]), None);
        assert_eq!(ArgLayout::FirstOrEmptyObject.apply(&[]), Some(json!({})));
        assert_eq!(ArgLayout::FirstOrEmptyArray.apply(&[Value::Null]), Some(json!([])));
    }

    #[test]
    fn path_strategies_belong_to_path_services() {
        for row in CATALOGUE {
            let is_path = matches!(shaping(row.operation), Shaping::Path(_));
            assert_eq!(
                is_path,
                row.service.convention() == Convention::Path,
                "{} has a mismatched strategy",
                row.name()
            );
        }
        assert_eq!(Service::Radio.convention(), Convention::Path);
    }

    proptest! {
        #[test]
        fn batch_always_yields_sequence(items in proptest::collection::vec(any::<i64>(), 0..8)) {
            let input = Value::Array(items.iter().map(|n| json!(n)).collect());
            let out = batch(Some(input.clone()));
            prop_assert_eq!(out, input);
        }

        #[test]
        fn batch_wraps_scalars(n in any::<i64>()) {
            prop_assert_eq!(batch(Some(json!(n))), json!([n]));
        }
    }
}
