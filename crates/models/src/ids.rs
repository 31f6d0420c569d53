//! Participant and group identifier normalisation.

const GROUP_SUFFIX: &str = "@g.us";
const USER_SUFFIX: &str = "@s.whatsapp.net";

/// Canonical form of a chat identifier.
///
/// Group ids are returned unchanged. A participant id whose local part is all
/// digits (`123`, `123@c.us`, `123@lid`, `123@s.whatsapp.net`) becomes
/// `123@s.whatsapp.net`. Anything else is returned unchanged.
pub fn normalize_id(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || is_group_id(raw) {
        return raw.to_string();
    }
    let local = raw.split_once('@').map_or(raw, |(local, _)| local);
    if !local.is_empty() && local.bytes().all(|b| b.is_ascii_digit()) {
        return format!("{local}{USER_SUFFIX}");
    }
    raw.to_string()
}

pub fn is_group_id(id: &str) -> bool {
    id.contains(GROUP_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_forms_collapse() {
        for raw in ["8801700000000", "8801700000000@c.us", "8801700000000@lid", "8801700000000@s.whatsapp.net"] {
            assert_eq!(normalize_id(raw), "8801700000000@s.whatsapp.net");
        }
    }

    #[test]
    fn groups_and_unknown_forms_pass_through() {
        assert_eq!(normalize_id("120363-1690000000@g.us"), "120363-1690000000@g.us");
        assert_eq!(normalize_id("1@x"), "1@s.whatsapp.net");
        assert_eq!(normalize_id("alice@example"), "alice@example");
        assert_eq!(normalize_id("  "), "");
        assert!(is_group_id("1-2@g.us"));
        assert!(!is_group_id("1@s.whatsapp.net"));
    }
}
