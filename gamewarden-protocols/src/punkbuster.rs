//! PunkBuster lines relayed through `punkBuster.onMessage`.
//!
//! The table order matters: ban-list lines would otherwise be taken for
//! player-list lines.

use once_cell::sync::Lazy;

use crate::pattern::PatternTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PbMessage {
    Version,
    ScheduledTask,
    LostConnection,
    MasterQuerySent,
    PlayerGuid,
    NewConnection,
    Ucon,
    PlistItem,
    ScreenshotReceived,
}

const PATTERNS: &[(&str, Option<PbMessage>)] = &[
    (
        r"^.*: PunkBuster Server for .+ \((?P<version>.+)\)\sEnabl.*$",
        Some(PbMessage::Version),
    ),
    (
        r"^.*: Running PB Scheduled Task \(slot #(?P<slot>\d+)\)\s+(?P<task>.*)$",
        Some(PbMessage::ScheduledTask),
    ),
    (
        r"^.*: Lost Connection \(slot #(?P<slot>\d+)\) (?P<ip>[^:]+):(?P<port>\d+) (?P<pbuid>[^\s]+)\(-\)\s(?P<name>.+)$",
        Some(PbMessage::LostConnection),
    ),
    (
        r"^.*: Master Query Sent to \((?P<pbmaster>[^\s]+)\) (?P<ip>[^:]+)$",
        Some(PbMessage::MasterQuerySent),
    ),
    (
        r"^.*: Player GUID Computed (?P<pbid>[0-9a-fA-F]+)\(-\) \(slot #(?P<slot>\d+)\) (?P<ip>[^:]+):(?P<port>\d+)\s(?P<name>.+)$",
        Some(PbMessage::PlayerGuid),
    ),
    (
        r#"^.*: New Connection \(slot #(?P<slot>\d+)\) (?P<ip>[^:]+):(?P<port>\d+) \[(?P<something>[^\s]+)\]\s"(?P<name>.+)".*$"#,
        Some(PbMessage::NewConnection),
    ),
    // ban list item
    (
        r#"^.*:\s+(?P<index>\d+)\s+(?P<pbid>[0-9a-fA-F]+) \{(?P<min_elapsed>\d+)/(?P<duration>\d+)\}\s+"(?P<name>[^"]+)"\s+"(?P<ip>[^:]+):(?P<port>\d+)"\s+"?(?P<reason>.*)"\s+"(?P<private_reason>.*)"$"#,
        None,
    ),
    (r"^.*: Guid=(?P<search>.*) Not Found in the Ban List$", None),
    (r"^.*: End of Ban List \(\d+ of \d+ displayed\)$", None),
    (r"^.*: Guid (?P<pbid>[0-9a-fA-F]+) has been Unbanned$", None),
    (
        r#"^.*: PB UCON "(?P<from>.+)"@(?P<ip>[\d.]+):(?P<port>\d+) \[(?P<cmd>.*)\]$"#,
        Some(PbMessage::Ucon),
    ),
    (
        r"^.*: Player List: \[Slot #\] \[GUID\] \[Address\] \[Status\] \[Power\] \[Auth Rate\] \[Recent SS\] \[O/S\] \[Name\]$",
        None,
    ),
    (
        r#"^.*: (?P<slot>\d+)\s+(?P<pbid>[0-9a-fA-F]+)\(-\) (?P<ip>[^:]+):(?P<port>\d+) (?P<status>.+)\s+(?P<power>\d+)\s+(?P<authrate>\d+\.\d+)\s+(?P<recentSS>\d+)\s+\((?P<os>.+)\)\s+"(?P<name>.+)".*$"#,
        Some(PbMessage::PlistItem),
    ),
    (r"^.*: End of Player List \(\d+ Players\)$", None),
    (r"^.*: Invalid Player Specified: (?P<data>.*)$", None),
    (r"^.*: Received Download File: (?P<file>.*)$", None),
    (r"^.*: Matched: (?P<name>.*) \(slot #(?P<slot>\d+)\)$", None),
    (r"^.*: (?P<num>\d+) Ban Records Updated in (?P<filename>.*)$", None),
    (r"^.*: Ban Added to Ban List$", None),
    (r"^.*: Ban Failed$", None),
    (r"^.*: Received Master Security Information$", None),
    (
        r"^.*: Auto Screenshot\s+(?P<ssid>\d+)\s+Requested from (?P<slot>\d+) (?P<name>.+)$",
        None,
    ),
    (
        r"^.*: Screenshot (?P<imgpath>.+)\s+successfully received \(MD5=(?P<md5>[0-9A-F]+)\) from (?P<slot>\d+) (?P<name>.+) \[(?P<pbid>[0-9a-fA-F]+)\(-\) (?P<ip>[^:]+):(?P<port>\d+)\]$",
        Some(PbMessage::ScreenshotReceived),
    ),
];

static TABLE: Lazy<Result<PatternTable<PbMessage>, regex::Error>> =
    Lazy::new(|| PatternTable::new(PATTERNS.iter().map(|(p, m)| (*p, *m))));

/// The shared, compiled PunkBuster table.
pub fn table() -> Result<&'static PatternTable<PbMessage>, regex::Error> {
    TABLE.as_ref().map_err(Clone::clone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Route;

    fn route(line: &str) -> Option<PbMessage> {
        match table().unwrap().route(line) {
            Route::Handled(msg, _) => Some(*msg),
            Route::Ignored(_) => None,
            Route::Unmatched => panic!("unmatched: {line}"),
        }
    }

    #[test]
    fn test_table_compiles() {
        assert_eq!(table().unwrap().len(), 23);
    }

    #[test]
    fn test_player_guid() {
        let line = "PunkBuster Server: Player GUID Computed 0837c128293d42aaaaaaaaaaaaaaaaa(-) (slot #1) 11.122.103.24:3659 Joe";
        assert_eq!(route(line), Some(PbMessage::PlayerGuid));
        if let Route::Handled(_, caps) = table().unwrap().route(line) {
            assert_eq!(&caps["ip"], "11.122.103.24");
            assert_eq!(&caps["name"], "Joe");
        }
    }

    #[test]
    fn test_new_connection() {
        let line = r#"PunkBuster Server: New Connection (slot #1) 11.122.103.24:3659 [something] "Joe" (seq 1)"#;
        assert_eq!(route(line), Some(PbMessage::NewConnection));
    }

    #[test]
    fn test_known_noise_is_ignored() {
        assert_eq!(route("PunkBuster Server: Ban Added to Ban List"), None);
        assert_eq!(route("PunkBuster Server: End of Player List (2 Players)"), None);
    }

    #[test]
    fn test_plist_item() {
        let line = r#"PunkBuster Server: 1  b3a6d10c3a2c2ca4d8d0de0b3e1c9f1c(-) 11.122.103.24:3659 OK   1 3.0 0 (W) "Joe""#;
        assert_eq!(route(line), Some(PbMessage::PlistItem));
    }

    #[test]
    fn test_unmatched_line() {
        assert!(matches!(
            table().unwrap().route("PunkBuster Server: something new"),
            Route::Unmatched
        ));
    }
}
