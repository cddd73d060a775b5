//! The public mirrorz catalogue document and its compact status codes.

use serde::{Deserialize, Serialize};

use mirrorfleet_api::{JobStatus, MirrorType, SyncStatus};

/// Top-level mirrorz document. The site block and endpoints come from static
/// configuration; `info` and `mirrors` are filled per request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorZ {
    pub version: f64,
    pub site: Site,
    #[serde(default)]
    pub info: Vec<Info>,
    #[serde(default)]
    pub mirrors: Vec<Mirror>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub extension: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Site {
    pub url: String,
    pub logo: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub logo_darkmode: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub abbr: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub homepage: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issue: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub disk: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub big: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Info {
    pub distro: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<InfoUrl>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfoUrl {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mirror {
    pub cname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub desc: String,
    pub url: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub upstream: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoint {
    pub label: String,
    pub public: bool,
    pub resolve: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub range: Vec<String>,
}

/// Encode a job's lifecycle into the mirrorz status code.
///
/// The primary letter reflects the current state (`S` synced, `D` scheduled,
/// `Y` syncing, `F` failed, `P` paused, `N` registered, `C` cache, `U`
/// unknown), suffixed with `X<next>` when a run is scheduled, `N<register>`
/// when nothing synced yet, and `O<last>` for the previous success while
/// syncing or failed. Returns the code plus the disabled flag.
pub fn status_code(mirror_type: Option<MirrorType>, s: &JobStatus) -> (String, bool) {
    if mirror_type == Some(MirrorType::Proxy) {
        return ("C".to_string(), false);
    }

    let mut disabled = false;
    let mut code = "U".to_string();
    match s.status {
        SyncStatus::Success if s.last_update != 0 => code = format!("S{}", s.last_update),
        SyncStatus::PreSyncing if s.scheduled != 0 => code = format!("D{}", s.scheduled),
        SyncStatus::Syncing if s.last_started != 0 => code = format!("Y{}", s.last_started),
        SyncStatus::Failed if s.last_ended != 0 => code = format!("F{}", s.last_ended),
        SyncStatus::Paused if s.last_ended != 0 => code = format!("P{}", s.last_ended),
        SyncStatus::Created if s.last_register != 0 => code = format!("N{}", s.last_register),
        SyncStatus::Disabled => disabled = true,
        _ => {}
    }

    if code != "U" {
        if s.scheduled != 0 {
            code.push_str(&format!("X{}", s.scheduled));
        }
        if s.last_update == 0 && s.last_register != 0 {
            code.push_str(&format!("N{}", s.last_register));
        }
        if matches!(s.status, SyncStatus::Syncing | SyncStatus::Failed) {
            code.push_str(&format!("O{}", s.last_update));
        }
    }

    (code, disabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(kind: SyncStatus) -> JobStatus {
        JobStatus {
            status: kind,
            ..Default::default()
        }
    }

    #[test]
    fn proxy_is_cache() {
        let (code, disabled) = status_code(Some(MirrorType::Proxy), &status(SyncStatus::None));
        assert_eq!(code, "C");
        assert!(!disabled);
    }

    #[test]
    fn success_with_schedule() {
        let mut s = status(SyncStatus::Success);
        s.last_update = 100;
        s.scheduled = 200;
        let (code, _) = status_code(None, &s);
        assert_eq!(code, "S100X200");
    }

    #[test]
    fn failed_keeps_last_update_suffix() {
        let mut s = status(SyncStatus::Failed);
        s.last_ended = 300;
        s.last_update = 250;
        let (code, _) = status_code(Some(MirrorType::Mirror), &s);
        assert_eq!(code, "F300O250");
    }

    #[test]
    fn registered_but_never_synced() {
        let mut s = status(SyncStatus::Created);
        s.last_register = 50;
        let (code, _) = status_code(None, &s);
        // primary N plus the no-update-yet suffix
        assert_eq!(code, "N50N50");
    }

    #[test]
    fn disabled_sets_flag_and_stays_unknown() {
        let s = status(SyncStatus::Disabled);
        let (code, disabled) = status_code(None, &s);
        assert_eq!(code, "U");
        assert!(disabled);
    }

    #[test]
    fn timestamps_of_zero_stay_unknown() {
        let (code, _) = status_code(None, &status(SyncStatus::Success));
        assert_eq!(code, "U");
    }

    #[test]
    fn site_block_round_trips_from_config() {
        let doc: MirrorZ = serde_json::from_str(
            r#"{"version": 1.7, "site": {"url": "https://mirrors.example.org", "logo": "", "name": "Example Mirrors"}}"#,
        )
        .unwrap();
        assert_eq!(doc.version, 1.7);
        assert_eq!(doc.site.name, "Example Mirrors");
        assert!(doc.mirrors.is_empty());
    }
}
