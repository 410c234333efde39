/// WHO region registry.
///
/// Display metadata for the six WHO regions. This is the single source of
/// truth for region names; other modules should look names up here rather
/// than hardcoding them.

use crate::model::WhoRegion;

// ---------------------------------------------------------------------------
// Region metadata
// ---------------------------------------------------------------------------

/// Metadata for a single WHO region.
pub struct RegionInfo {
    pub region: WhoRegion,
    /// English display name, as used on distribution chart labels.
    pub name: &'static str,
}

/// All WHO regions, in source feed order.
pub static REGION_REGISTRY: &[RegionInfo] = &[
    RegionInfo {
        region: WhoRegion::Afr,
        name: "Africa",
    },
    RegionInfo {
        region: WhoRegion::Amr,
        name: "Americas",
    },
    RegionInfo {
        region: WhoRegion::Emr,
        name: "Eastern Mediterranean",
    },
    RegionInfo {
        region: WhoRegion::Eur,
        name: "Europe",
    },
    RegionInfo {
        region: WhoRegion::Sear,
        name: "South-East Asia",
    },
    RegionInfo {
        region: WhoRegion::Wpr,
        name: "Western Pacific",
    },
];

/// Returns the region codes for all registered regions.
pub fn all_region_codes() -> Vec<&'static str> {
    REGION_REGISTRY.iter().map(|r| r.region.code()).collect()
}

/// Looks up a region by its code. Returns `None` if not found.
pub fn find_region(code: &str) -> Option<&'static RegionInfo> {
    let region = WhoRegion::from_symbol(code)?;
    REGION_REGISTRY.iter().find(|r| r.region == region)
}

/// Display name for a region code. Codes outside the registry are returned
/// verbatim so non-canonical source values stay visible.
pub fn display_name(code: &str) -> String {
    find_region(code)
        .map(|r| r.name.to_string())
        .unwrap_or_else(|| code.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_region_exactly_once() {
        assert_eq!(REGION_REGISTRY.len(), WhoRegion::ALL.len());
        let mut seen = std::collections::HashSet::new();
        for info in REGION_REGISTRY {
            assert!(
                seen.insert(info.region),
                "duplicate region '{}' found in REGION_REGISTRY",
                info.region
            );
        }
    }

    #[test]
    fn test_all_region_codes_helper_matches_registry_order() {
        assert_eq!(
            all_region_codes(),
            vec!["AFR", "AMR", "EMR", "EUR", "SEAR", "WPR"]
        );
    }

    #[test]
    fn test_find_region_returns_correct_entry() {
        let info = find_region("SEAR").expect("SEAR should be in registry");
        assert_eq!(info.region, WhoRegion::Sear);
        assert_eq!(info.name, "South-East Asia");
    }

    #[test]
    fn test_display_name_passes_unknown_codes_through() {
        assert_eq!(display_name("EUR"), "Europe");
        assert_eq!(display_name("Unknown"), "Unknown");
        assert_eq!(display_name("XYZ"), "XYZ");
        assert_eq!(display_name("eur"), "eur", "only the exact symbol is named");
    }
}
