//! Static operation catalogue.
//!
//! Every operation the client can issue is one row here. Adding an operation
//! means adding an [`Operation`] variant, one [`CATALOGUE`] row, and a shaping
//! rule in [`crate::shaping`] (the match there is exhaustive).

use std::fmt;

use serde::Serialize;

use crate::service::Service;

/// HTTP method of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// One business operation exposed by a backend service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operation {
    // CAD general
    GetServers,
    SetServers,
    GetVersion,
    SetPenalCodes,
    SetApiId,
    GetTemplates,
    NewRecord,
    EditRecord,
    RemoveRecord,
    LookupInt,
    Lookup,
    GetAccount,
    CheckApiid,
    ApplyPermissionKey,
    SetAccountPermissions,
    BanUser,
    VerifySecret,
    AuthStreetsigns,
    SetPostals,
    SendPhoto,
    SetClock,
    JoinCommunity,
    LeaveCommunity,
    // CAD civilian
    GetCharacters,
    NewCharacter,
    EditCharacter,
    RemoveCharacter,
    // CAD emergency
    GetIdentifiers,
    ModifyIdentifier,
    SetIdentifier,
    UnitPanic,
    UnitStatus,
    GetBlips,
    AddBlip,
    ModifyBlip,
    RemoveBlip,
    Call911,
    Remove911,
    GetCalls,
    GetActiveUnits,
    KickUnit,
    NewDispatch,
    AttachUnit,
    DetachUnit,
    SetCallPostal,
    SetCallPrimary,
    AddCallNote,
    CloseCall,
    UnitLocation,
    SetStreetsignConfig,
    UpdateStreetsign,
    // CMS general
    GetComAccount,
    GetCurrentClockIn,
    GetAccounts,
    GetAccountRanks,
    SetAccountRanks,
    GetDepartments,
    GetProfileFields,
    GetSubVersion,
    CheckComApiid,
    ClockInOut,
    KickAccount,
    BanAccount,
    EditAccProfileFields,
    SetAccountName,
    ForceSync,
    // CMS servers
    GetGameServers,
    SetGameServers,
    VerifyWhitelist,
    FullWhitelist,
    // CMS events
    Rsvp,
    // CMS forms
    ChangeFormStage,
    GetFormTemplateSubmissions,
    // CMS communities
    CommunityLookup,
    // CMS ERLC
    ErlcGetOnlinePlayers,
    ErlcGetPlayerQueue,
    ErlcAddNewRecord,
    // Radio
    RadioGetCommunityChannels,
    RadioGetConnectedUsers,
    RadioGetConnectedUser,
    RadioSetUserChannels,
    RadioSetUserDisplayName,
    RadioGetServerSubscriptionFromIp,
    RadioSetServerIp,
    RadioSetInGameSpeakerLocations,
}

impl Operation {
    /// Wire type string, as callers name the operation.
    ///
    /// `LOOKUP` is shared by [`Operation::Lookup`] (CAD) and
    /// [`Operation::CommunityLookup`] (CMS).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Operation::GetServers => "GET_SERVERS",
            Operation::SetServers => "SET_SERVERS",
            Operation::GetVersion => "GET_VERSION",
            Operation::SetPenalCodes => "SET_PENAL_CODES",
            Operation::SetApiId => "SET_API_ID",
            Operation::GetTemplates => "GET_TEMPLATES",
            Operation::NewRecord => "NEW_RECORD",
            Operation::EditRecord => "EDIT_RECORD",
            Operation::RemoveRecord => "REMOVE_RECORD",
            Operation::LookupInt => "LOOKUP_INT",
            Operation::Lookup => "LOOKUP",
            Operation::GetAccount => "GET_ACCOUNT",
            Operation::CheckApiid => "CHECK_APIID",
            Operation::ApplyPermissionKey => "APPLY_PERMISSION_KEY",
            Operation::SetAccountPermissions => "SET_ACCOUNT_PERMISSIONS",
            Operation::BanUser => "BAN_USER",
            Operation::VerifySecret => "VERIFY_SECRET",
            Operation::AuthStreetsigns => "AUTH_STREETSIGNS",
            Operation::SetPostals => "SET_POSTALS",
            Operation::SendPhoto => "SEND_PHOTO",
            Operation::SetClock => "SET_CLOCK",
            Operation::JoinCommunity => "JOIN_COMMUNITY",
            Operation::LeaveCommunity => "LEAVE_COMMUNITY",
            Operation::GetCharacters => "GET_CHARACTERS",
            Operation::NewCharacter => "NEW_CHARACTER",
            Operation::EditCharacter => "EDIT_CHARACTER",
            Operation::RemoveCharacter => "REMOVE_CHARACTER",
            Operation::GetIdentifiers => "GET_IDENTIFIERS",
            Operation::ModifyIdentifier => "MODIFY_IDENTIFIER",
            Operation::SetIdentifier => "SET_IDENTIFIER",
            Operation::UnitPanic => "UNIT_PANIC",
            Operation::UnitStatus => "UNIT_STATUS",
            Operation::GetBlips => "GET_BLIPS",
            Operation::AddBlip => "ADD_BLIP",
            Operation::ModifyBlip => "MODIFY_BLIP",
            Operation::RemoveBlip => "REMOVE_BLIP",
            Operation::Call911 => "911_CALL",
            Operation::Remove911 => "REMOVE_911",
            Operation::GetCalls => "GET_CALLS",
            Operation::GetActiveUnits => "GET_ACTIVE_UNITS",
            Operation::KickUnit => "KICK_UNIT",
            Operation::NewDispatch => "NEW_DISPATCH",
            Operation::AttachUnit => "ATTACH_UNIT",
            Operation::DetachUnit => "DETACH_UNIT",
            Operation::SetCallPostal => "SET_CALL_POSTAL",
            Operation::SetCallPrimary => "SET_CALL_PRIMARY",
            Operation::AddCallNote => "ADD_CALL_NOTE",
            Operation::CloseCall => "CLOSE_CALL",
            Operation::UnitLocation => "UNIT_LOCATION",
            Operation::SetStreetsignConfig => "SET_STREETSIGN_CONFIG",
            Operation::UpdateStreetsign => "UPDATE_STREETSIGN",
            Operation::GetComAccount => "GET_COM_ACCOUNT",
            Operation::GetCurrentClockIn => "GET_CURRENT_CLOCK_IN",
            Operation::GetAccounts => "GET_ACCOUNTS",
            Operation::GetAccountRanks => "GET_ACCOUNT_RANKS",
            Operation::SetAccountRanks => "SET_ACCOUNT_RANKS",
            Operation::GetDepartments => "GET_DEPARTMENTS",
            Operation::GetProfileFields => "GET_PROFILE_FIELDS",
            Operation::GetSubVersion => "GET_SUB_VERSION",
            Operation::CheckComApiid => "CHECK_COM_APIID",
            Operation::ClockInOut => "CLOCK_IN_OUT",
            Operation::KickAccount => "KICK_ACCOUNT",
            Operation::BanAccount => "BAN_ACCOUNT",
            Operation::EditAccProfileFields => "EDIT_ACC_PROFLIE_FIELDS",
            Operation::SetAccountName => "SET_ACCOUNT_NAME",
            Operation::ForceSync => "FORCE_SYNC",
            Operation::GetGameServers => "GET_GAME_SERVERS",
            Operation::SetGameServers => "SET_GAME_SERVERS",
            Operation::VerifyWhitelist => "VERIFY_WHITELIST",
            Operation::FullWhitelist => "FULL_WHITELIST",
            Operation::Rsvp => "RSVP",
            Operation::ChangeFormStage => "CHANGE_FORM_STAGE",
            Operation::GetFormTemplateSubmissions => "GET_FORM_TEMPLATE_SUBMISSIONS",
            Operation::CommunityLookup => "LOOKUP",
            Operation::ErlcGetOnlinePlayers => "ERLC_GET_ONLINE_PLAYERS",
            Operation::ErlcGetPlayerQueue => "ERLC_GET_PLAYER_QUEUE",
            Operation::ErlcAddNewRecord => "ERLC_ADD_NEW_RECORD",
            Operation::RadioGetCommunityChannels => "RADIO_GET_COMMUNITY_CHANNELS",
            Operation::RadioGetConnectedUsers => "RADIO_GET_CONNECTED_USERS",
            Operation::RadioGetConnectedUser => "RADIO_GET_CONNECTED_USER",
            Operation::RadioSetUserChannels => "RADIO_SET_USER_CHANNELS",
            Operation::RadioSetUserDisplayName => "RADIO_SET_USER_DISPLAY_NAME",
            Operation::RadioGetServerSubscriptionFromIp => "RADIO_GET_SERVER_SUBSCRIPTION_FROM_IP",
            Operation::RadioSetServerIp => "RADIO_SET_SERVER_IP",
            Operation::RadioSetInGameSpeakerLocations => "RADIO_SET_IN_GAME_SPEAKER_LOCATIONS",
        }
    }

    /// Catalogue row for this operation.
    #[must_use]
    pub fn descriptor(self) -> &'static OperationDescriptor {
        CATALOGUE
            .iter()
            .find(|row| row.operation == self)
            .unwrap_or_else(|| unreachable!("every operation has a catalogue row"))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// OperationDescriptor
// ---------------------------------------------------------------------------

/// Immutable wire definition of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationDescriptor {
    pub operation: Operation,
    pub service: Service,
    /// Path below the service base URL, without leading slash.
    pub path: &'static str,
    pub method: Method,
    /// Lowest subscription version allowed to call the operation.
    pub min_version: u8,
}

impl OperationDescriptor {
    /// Wire type string of the described operation.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.operation.name()
    }
}

const fn row(
    operation: Operation,
    service: Service,
    path: &'static str,
    method: Method,
    min_version: u8,
) -> OperationDescriptor {
    OperationDescriptor {
        operation,
        service,
        path,
        method,
        min_version,
    }
}

pub static CATALOGUE: &[OperationDescriptor] = &[
    // CAD general
    row(Operation::GetServers, Service::Cad, "general/get_servers", Method::Post, 2),
    row(Operation::SetServers, Service::Cad, "general/set_servers", Method::Post, 3),
    row(Operation::GetVersion, Service::Cad, "general/get_version", Method::Post, 0),
    row(Operation::SetPenalCodes, Service::Cad, "general/set_penal_codes", Method::Post, 2),
    row(Operation::SetApiId, Service::Cad, "general/set_api_id", Method::Post, 2),
    row(Operation::GetTemplates, Service::Cad, "general/get_templates", Method::Post, 2),
    row(Operation::NewRecord, Service::Cad, "general/new_record", Method::Post, 3),
    row(Operation::EditRecord, Service::Cad, "general/edit_record", Method::Post, 3),
    row(Operation::RemoveRecord, Service::Cad, "general/remove_record", Method::Post, 3),
    row(Operation::LookupInt, Service::Cad, "general/lookup_int", Method::Post, 3),
    row(Operation::Lookup, Service::Cad, "general/lookup", Method::Post, 3),
    row(Operation::GetAccount, Service::Cad, "general/get_account", Method::Post, 3),
    row(Operation::CheckApiid, Service::Cad, "general/check_apiid", Method::Post, 2),
    row(Operation::ApplyPermissionKey, Service::Cad, "general/apply_permission_key", Method::Post, 3),
    row(Operation::SetAccountPermissions, Service::Cad, "general/set_account_permissions", Method::Post, 3),
    row(Operation::BanUser, Service::Cad, "general/ban_user", Method::Post, 3),
    row(Operation::VerifySecret, Service::Cad, "general/verify_secret", Method::Post, 2),
    row(Operation::AuthStreetsigns, Service::Cad, "general/auth_streetsigns", Method::Post, 4),
    row(Operation::SetPostals, Service::Cad, "general/set_postals", Method::Post, 4),
    row(Operation::SendPhoto, Service::Cad, "general/send_photo", Method::Post, 4),
    row(Operation::SetClock, Service::Cad, "general/set_clock", Method::Post, 3),
    row(Operation::JoinCommunity, Service::Cad, "sso/community", Method::Post, 0),
    row(Operation::LeaveCommunity, Service::Cad, "sso/community", Method::Post, 0),
    // CAD civilian
    row(Operation::GetCharacters, Service::Cad, "civilian/get_characters", Method::Post, 2),
    row(Operation::NewCharacter, Service::Cad, "civilian/new_character", Method::Post, 2),
    row(Operation::EditCharacter, Service::Cad, "civilian/edit_characters", Method::Post, 2),
    row(Operation::RemoveCharacter, Service::Cad, "civilian/remove_character", Method::Post, 2),
    // CAD emergency
    row(Operation::GetIdentifiers, Service::Cad, "emergency/get_identifiers", Method::Post, 3),
    row(Operation::ModifyIdentifier, Service::Cad, "emergency/modify_identifier", Method::Post, 4),
    row(Operation::SetIdentifier, Service::Cad, "emergency/set_identifier", Method::Post, 3),
    row(Operation::UnitPanic, Service::Cad, "emergency/unit_panic", Method::Post, 2),
    row(Operation::UnitStatus, Service::Cad, "emergency/unit_status", Method::Post, 2),
    row(Operation::GetBlips, Service::Cad, "emergency/get_blips", Method::Post, 4),
    row(Operation::AddBlip, Service::Cad, "emergency/add_blip", Method::Post, 4),
    row(Operation::ModifyBlip, Service::Cad, "emergency/modify_blip", Method::Post, 4),
    row(Operation::RemoveBlip, Service::Cad, "emergency/remove_blip", Method::Post, 4),
    row(Operation::Call911, Service::Cad, "emergency/911_call", Method::Post, 2),
    row(Operation::Remove911, Service::Cad, "emergency/remove_911", Method::Post, 2),
    row(Operation::GetCalls, Service::Cad, "emergency/get_calls", Method::Post, 3),
    row(Operation::GetActiveUnits, Service::Cad, "emergency/get_active_units", Method::Post, 3),
    row(Operation::KickUnit, Service::Cad, "emergency/kick_unit", Method::Post, 2),
    row(Operation::NewDispatch, Service::Cad, "emergency/new_dispatch", Method::Post, 3),
    row(Operation::AttachUnit, Service::Cad, "emergency/attach_unit", Method::Post, 3),
    row(Operation::DetachUnit, Service::Cad, "emergency/detach_unit", Method::Post, 3),
    row(Operation::SetCallPostal, Service::Cad, "emergency/set_call_postal", Method::Post, 3),
    row(Operation::SetCallPrimary, Service::Cad, "emergency/set_call_primary", Method::Post, 3),
    row(Operation::AddCallNote, Service::Cad, "emergency/add_call_note", Method::Post, 3),
    row(Operation::CloseCall, Service::Cad, "emergency/close_call", Method::Post, 2),
    row(Operation::UnitLocation, Service::Cad, "emergency/unit_location", Method::Post, 2),
    row(Operation::SetStreetsignConfig, Service::Cad, "emergency/set_streetsign_config", Method::Post, 4),
    row(Operation::UpdateStreetsign, Service::Cad, "emergency/update_streetsign", Method::Post, 4),
    // CMS general
    row(Operation::GetComAccount, Service::Cms, "general/get_com_account", Method::Post, 3),
    row(Operation::GetCurrentClockIn, Service::Cms, "general/get_current_clock_in", Method::Post, 0),
    row(Operation::GetAccounts, Service::Cms, "general/get_accounts", Method::Post, 0),
    row(Operation::GetAccountRanks, Service::Cms, "general/get_account_ranks", Method::Post, 2),
    row(Operation::SetAccountRanks, Service::Cms, "general/set_account_ranks", Method::Post, 2),
    row(Operation::GetDepartments, Service::Cms, "general/get_departments", Method::Post, 2),
    row(Operation::GetProfileFields, Service::Cms, "general/get_profile_fields", Method::Post, 0),
    row(Operation::GetSubVersion, Service::Cms, "general/get_sub_version", Method::Post, 0),
    row(Operation::CheckComApiid, Service::Cms, "general/check_com_apiid", Method::Post, 2),
    row(Operation::ClockInOut, Service::Cms, "general/clock_in_out", Method::Post, 3),
    row(Operation::KickAccount, Service::Cms, "general/kick_account", Method::Post, 0),
    row(Operation::BanAccount, Service::Cms, "general/ban_account", Method::Post, 0),
    row(Operation::EditAccProfileFields, Service::Cms, "general/edit_acc_profile_fields", Method::Post, 0),
    row(Operation::SetAccountName, Service::Cms, "general/set_account_name", Method::Post, 0),
    row(Operation::ForceSync, Service::Cms, "general/force_sync", Method::Post, 0),
    // CMS servers
    row(Operation::GetGameServers, Service::Cms, "servers/get_game_servers", Method::Post, 2),
    row(Operation::SetGameServers, Service::Cms, "servers/set_game_servers", Method::Post, 2),
    row(Operation::VerifyWhitelist, Service::Cms, "servers/verify_whitelist", Method::Post, 3),
    row(Operation::FullWhitelist, Service::Cms, "servers/full_whitelist", Method::Post, 3),
    // CMS events
    row(Operation::Rsvp, Service::Cms, "events/rsvp", Method::Post, 3),
    // CMS forms
    row(Operation::ChangeFormStage, Service::Cms, "forms/change/stage", Method::Post, 0),
    row(Operation::GetFormTemplateSubmissions, Service::Cms, "forms/get_template_submissions", Method::Post, 0),
    // CMS communities
    row(Operation::CommunityLookup, Service::Cms, "communities/lookup", Method::Post, 0),
    // CMS ERLC
    row(Operation::ErlcGetOnlinePlayers, Service::Cms, "erlc/get_online_players", Method::Post, 0),
    row(Operation::ErlcGetPlayerQueue, Service::Cms, "erlc/get_player_queue", Method::Post, 0),
    row(Operation::ErlcAddNewRecord, Service::Cms, "erlc/add_new_record", Method::Post, 0),
    // Radio
    row(Operation::RadioGetCommunityChannels, Service::Radio, "api/radio/get-community-channels", Method::Get, 0),
    row(Operation::RadioGetConnectedUsers, Service::Radio, "api/radio/get-connected-users", Method::Get, 0),
    row(Operation::RadioGetConnectedUser, Service::Radio, "api/radio/get-connected-user", Method::Get, 0),
    row(Operation::RadioSetUserChannels, Service::Radio, "api/radio/set-user-channels", Method::Post, 0),
    row(Operation::RadioSetUserDisplayName, Service::Radio, "api/set-user-display-name", Method::Post, 0),
    row(Operation::RadioGetServerSubscriptionFromIp, Service::Radio, "radio/check-server-subscription", Method::Get, 0),
    row(Operation::RadioSetServerIp, Service::Radio, "radio/set-server-ip", Method::Post, 0),
    row(Operation::RadioSetInGameSpeakerLocations, Service::Radio, "radio/set-server-speakers", Method::Post, 0),
];

/// Finds the first row whose type string is `name`.
///
/// An unqualified `LOOKUP` therefore resolves to the CAD row; use
/// [`find_for`] to reach the CMS one.
#[must_use]
pub fn find(name: &str) -> Option<&'static OperationDescriptor> {
    CATALOGUE.iter().find(|row| row.name() == name)
}

/// Finds the row named `name` owned by `service`.
#[must_use]
pub fn find_for(service: Service, name: &str) -> Option<&'static OperationDescriptor> {
    CATALOGUE
        .iter()
        .find(|row| row.service == service && row.name() == name)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_operation_has_exactly_one_row() {
        let mut seen = HashSet::new();
        for row in CATALOGUE {
            assert!(seen.insert(row.operation), "duplicate row for {:?}", row.operation);
            assert_eq!(row.operation.descriptor(), row);
        }
        assert_eq!(seen.len(), CATALOGUE.len());
    }

    #[test]
    fn paths_are_relative() {
        for row in CATALOGUE {
            assert!(!row.path.starts_with('/'), "{} has a leading slash", row.name());
            assert!(!row.path.is_empty());
        }
    }

    #[test]
    fn find_returns_cad_lookup_first() {
        let row = find("LOOKUP").unwrap();
        assert_eq!(row.service, Service::Cad);
        assert_eq!(row.path, "general/lookup");

        let cms = find_for(Service::Cms, "LOOKUP").unwrap();
        assert_eq!(cms.operation, Operation::CommunityLookup);
        assert_eq!(cms.path, "communities/lookup");
    }

    #[test]
    fn unknown_type_is_absent() {
        assert!(find("NOT_AN_OPERATION").is_none());
        assert!(find_for(Service::Radio, "GET_ACCOUNT").is_none());
    }

    #[test]
    fn radio_rows_use_read_and_write_methods() {
        assert_eq!(find("RADIO_GET_CONNECTED_USERS").unwrap().method, Method::Get);
        assert_eq!(find("RADIO_SET_USER_CHANNELS").unwrap().method, Method::Post);
        assert!(CATALOGUE
            .iter()
            .filter(|row| row.service != Service::Radio)
            .all(|row| row.method == Method::Post));
    }

    #[test]
    fn get_account_row() {
        let row = find("GET_ACCOUNT").unwrap();
        assert_eq!(row.operation, Operation::GetAccount);
        assert_eq!(row.service, Service::Cad);
        assert_eq!(row.path, "general/get_account");
        assert_eq!(row.min_version, 3);
    }
}
