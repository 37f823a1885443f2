use std::collections::BTreeMap;

use crate::registry::{MineralInputMode, TemplateVersionDef};

/// Prefix of the synthetic keys given to reporter-typed minerals (`other-0`, `other-1`, ...).
pub const OTHER_MINERAL_PREFIX: &str = "other-";

pub fn other_mineral_key(index: usize) -> String {
    format!("{OTHER_MINERAL_PREFIX}{index}")
}

/// `"other-3"` -> `Some(3)`.
pub fn parse_other_mineral_key(key: &str) -> Option<usize> {
    key.strip_prefix(OTHER_MINERAL_PREFIX)?.parse().ok()
}

/// Mineral keys currently in scope for a report.
///
/// Fixed templates always cover every declared mineral. Dropdown templates cover the selected
/// ones plus one `other-i` key per non-empty custom label when `other` is selected. Free-text
/// templates cover the declared key at each slot whose custom label is non-empty.
pub fn active_mineral_keys(
    def: &TemplateVersionDef,
    selected: &[String],
    custom: &[String],
) -> Vec<String> {
    let scope = &def.mineral_scope;
    match scope.mode {
        MineralInputMode::Fixed => scope.keys().map(str::to_string).collect(),
        MineralInputMode::DynamicDropdown => {
            let is_selected = |key: &str| selected.iter().any(|s| s == key);
            let mut keys: Vec<String> = scope
                .keys()
                .filter(|&k| k != "other" && is_selected(k))
                .map(str::to_string)
                .collect();
            if is_selected("other") {
                keys.extend(
                    custom
                        .iter()
                        .enumerate()
                        .filter(|(_, label)| !label.trim().is_empty())
                        .map(|(i, _)| other_mineral_key(i)),
                );
            }
            keys
        }
        MineralInputMode::FreeText => scope
            .keys()
            .enumerate()
            .filter(|(i, _)| custom.get(*i).is_some_and(|l| !l.trim().is_empty()))
            .map(|(_, k)| k.to_string())
            .collect(),
    }
}

/// Reporter-typed labels keyed by the mineral key they stand for.
pub fn custom_mineral_labels(
    def: &TemplateVersionDef,
    selected: &[String],
    custom: &[String],
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    match def.mineral_scope.mode {
        MineralInputMode::FreeText => {
            for (i, key) in def.mineral_scope.keys().enumerate() {
                if let Some(label) = custom.get(i).map(|l| l.trim()).filter(|l| !l.is_empty()) {
                    labels.insert(key.to_string(), label.to_string());
                }
            }
        }
        MineralInputMode::DynamicDropdown if selected.iter().any(|s| s == "other") => {
            for (i, label) in custom.iter().enumerate() {
                let label = label.trim();
                if !label.is_empty() {
                    labels.insert(other_mineral_key(i), label.to_string());
                }
            }
        }
        _ => {}
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{version_def, TemplateType};
    use pretty_assertions::assert_eq;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_other_keys() {
        assert_eq!(parse_other_mineral_key("other-3"), Some(3));
        assert_eq!(parse_other_mineral_key("other-"), None);
        assert_eq!(parse_other_mineral_key("other"), None);
        assert_eq!(parse_other_mineral_key("cobalt"), None);
    }

    #[test]
    fn fixed_scope_is_always_everything() {
        let def = version_def(TemplateType::Cmrt, "6.5").unwrap();
        assert_eq!(
            active_mineral_keys(def, &[], &[]),
            strings(&["tantalum", "tin", "gold", "tungsten"])
        );
    }

    #[test]
    fn dropdown_scope_follows_declaration_order_and_other_slots() {
        let def = version_def(TemplateType::Amrt, "1.3").unwrap();
        let selected = strings(&["zinc", "other", "aluminum"]);
        let custom = strings(&["Cobalt", "  ", "Tin"]);
        assert_eq!(
            active_mineral_keys(def, &selected, &custom),
            strings(&["aluminum", "zinc", "other-0", "other-2"])
        );

        let labels = custom_mineral_labels(def, &selected, &custom);
        assert_eq!(labels.get("other-2").map(String::as_str), Some("Tin"));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn free_text_scope_uses_filled_slots() {
        let def = version_def(TemplateType::Amrt, "1.1").unwrap();
        let custom = strings(&["Aluminium", "", "Lithium"]);
        assert_eq!(
            active_mineral_keys(def, &[], &custom),
            strings(&["aluminum", "lithium"])
        );
    }
}
