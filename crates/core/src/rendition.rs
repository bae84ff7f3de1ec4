//! The rendition catalog and access tiers.
//!
//! Renditions are derived, resized copies of an original at fixed bounding
//! boxes. The catalog is a compile-time constant consulted by the derivative
//! engine and the publisher; it is not a database entity. Changing it without
//! a backfill leaves existing archives with a stale rendition set, which the
//! batch reconciler exists to close.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized output extension for all renditions.
pub const NORMALIZED_EXT: &str = "jpg";

/// Access-control classification applied to an artifact at publish time.
///
/// The large classes and the original are restricted: full-size imagery is
/// the content most valuable to unauthorized bulk harvesting, while the
/// small gallery classes stay public so normal browsing needs no
/// authentication. Restricted artifacts are reachable through signed,
/// time-limited URLs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Public,
    Restricted,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Public => write!(f, "public"),
            Tier::Restricted => write!(f, "restricted"),
        }
    }
}

/// A named entry in the rendition catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenditionClass {
    /// Short code embedded in filenames, e.g. `t` in `<stem>_t.jpg`.
    pub code: &'static str,
    /// Bounding box width. Renditions fit within the box, never upscaled.
    pub max_width: u32,
    /// Bounding box height.
    pub max_height: u32,
    /// Access tier applied when publishing this class.
    pub tier: Tier,
}

impl RenditionClass {
    /// Look up a class by its short code.
    pub fn by_code(code: &str) -> crate::Result<&'static RenditionClass> {
        CATALOG
            .iter()
            .find(|c| c.code == code)
            .ok_or_else(|| crate::Error::UnknownRenditionClass(code.to_string()))
    }

    /// Whether this class's box fully contains another's.
    ///
    /// Used by the reconciler to decide if an existing rendition is an
    /// acceptable derivation source for a smaller class.
    pub fn covers(&self, other: &RenditionClass) -> bool {
        self.max_width >= other.max_width && self.max_height >= other.max_height
    }
}

/// The fixed rendition catalog, ordered smallest to largest.
pub const CATALOG: &[RenditionClass] = &[
    RenditionClass { code: "t", max_width: 100, max_height: 100, tier: Tier::Public },
    RenditionClass { code: "m", max_width: 240, max_height: 240, tier: Tier::Public },
    RenditionClass { code: "n", max_width: 320, max_height: 230, tier: Tier::Public },
    RenditionClass { code: "k", max_width: 500, max_height: 500, tier: Tier::Restricted },
    RenditionClass { code: "c", max_width: 800, max_height: 800, tier: Tier::Restricted },
    RenditionClass { code: "b", max_width: 1024, max_height: 1024, tier: Tier::Restricted },
];

/// Lowercase file type (extension) from a filename.
pub fn file_type_from_name(name: &str) -> Option<String> {
    let ext = name.rsplit_once('.')?.1;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Content type for a file type, falling back to octet-stream.
pub fn content_type_for(file_type: &str) -> &'static str {
    match file_type {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_tier_policy() {
        // Small gallery classes public, large classes restricted.
        for class in CATALOG {
            let expected = if class.max_width >= 500 {
                Tier::Restricted
            } else {
                Tier::Public
            };
            assert_eq!(class.tier, expected, "class {}", class.code);
        }
    }

    #[test]
    fn test_catalog_ordered_by_size() {
        for pair in CATALOG.windows(2) {
            assert!(pair[0].max_width < pair[1].max_width);
        }
    }

    #[test]
    fn test_by_code() {
        assert_eq!(RenditionClass::by_code("b").unwrap().max_width, 1024);
        assert!(RenditionClass::by_code("xl").is_err());
    }

    #[test]
    fn test_catalog_boxes_are_stable() {
        // Filenames embed the class code, so these boxes are a storage
        // format constant; n is the one non-square box.
        let boxes: Vec<(&str, u32, u32)> = CATALOG
            .iter()
            .map(|c| (c.code, c.max_width, c.max_height))
            .collect();
        assert_eq!(
            boxes,
            vec![
                ("t", 100, 100),
                ("m", 240, 240),
                ("n", 320, 230),
                ("k", 500, 500),
                ("c", 800, 800),
                ("b", 1024, 1024),
            ]
        );
    }

    #[test]
    fn test_covers() {
        let b = RenditionClass::by_code("b").unwrap();
        let t = RenditionClass::by_code("t").unwrap();
        assert!(b.covers(t));
        assert!(!t.covers(b));
        assert!(b.covers(b));
    }

    #[test]
    fn test_file_type_from_name() {
        assert_eq!(file_type_from_name("IMG_0001.JPG").as_deref(), Some("jpg"));
        assert_eq!(file_type_from_name("scan.tiff").as_deref(), Some("tiff"));
        assert_eq!(file_type_from_name("noext"), None);
        assert_eq!(file_type_from_name("trailing."), None);
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("jpg"), "image/jpeg");
        assert_eq!(content_type_for("png"), "image/png");
        assert_eq!(content_type_for("raw"), "application/octet-stream");
    }
}
