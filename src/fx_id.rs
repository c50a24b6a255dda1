//! Effect identifier normalization
//!
//! The amp addresses effects by bare ids (`bias.noisegate`, `Twin`), while tones and
//! the catalog use ids qualified with the device namespace (`pg.spark40.Twin`).
//! Reverb variants are one effect on the device with internal modes, so change
//! commands always use the family id.

/// Namespace prefix of the supported amp model
pub const DEFAULT_NAMESPACE: &str = "pg.spark40.";

/// Family id every reverb variant folds to
pub const REVERB_FAMILY: &str = "bias.reverb";

/// Maps between qualified effect ids and the device's bare id space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FxIdNormalizer {
    namespace: String,
    families: Vec<String>,
}

impl FxIdNormalizer {
    /// Create a normalizer for `namespace` with the reverb family folded
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            families: vec![REVERB_FAMILY.to_string()],
        }
    }

    /// Replace the folded families
    pub fn with_families(mut self, families: Vec<String>) -> Self {
        self.families = families;
        self
    }

    /// The namespace prefix, including the trailing dot
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Remove the namespace prefix, without folding families
    pub fn strip<'a>(&self, id: &'a str) -> &'a str {
        id.strip_prefix(self.namespace.as_str()).unwrap_or(id)
    }

    /// Device id used in change commands: namespace stripped, families folded.
    ///
    /// Folding is lossy: `expand` cannot recover which reverb variant was meant.
    pub fn normalize(&self, id: &str) -> String {
        let bare = self.strip(id);
        self.families
            .iter()
            .find(|family| bare.starts_with(family.as_str()))
            .cloned()
            .unwrap_or_else(|| bare.to_string())
    }

    /// Qualified id; already-qualified ids are returned unchanged
    pub fn expand(&self, id: &str) -> String {
        if self.is_qualified(id) {
            id.to_string()
        } else {
            format!("{}{}", self.namespace, id)
        }
    }

    pub fn is_qualified(&self, id: &str) -> bool {
        id.starts_with(self.namespace.as_str())
    }

    /// Whether two ids (qualified or bare) address the same device effect
    pub fn same_effect(&self, a: &str, b: &str) -> bool {
        self.normalize(a) == self.normalize(b)
    }
}

impl Default for FxIdNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_strips_namespace() {
        let ids = FxIdNormalizer::default();
        assert_eq!(ids.normalize("pg.spark40.Twin"), "Twin");
        assert_eq!(ids.normalize("bias.noisegate"), "bias.noisegate");
    }

    #[test]
    fn test_reverb_variants_fold_to_family() {
        let ids = FxIdNormalizer::default();
        assert_eq!(ids.normalize("pg.spark40.bias.reverb.3"), "bias.reverb");
        assert_eq!(ids.normalize("bias.reverb.0"), "bias.reverb");
        assert_eq!(ids.normalize("bias.reverb"), "bias.reverb");

        // Folding is not inverted
        assert_eq!(
            ids.expand(&ids.normalize("pg.spark40.bias.reverb.3")),
            "pg.spark40.bias.reverb"
        );
    }

    #[test]
    fn test_expand_is_idempotent() {
        let ids = FxIdNormalizer::default();
        assert_eq!(ids.expand("Twin"), "pg.spark40.Twin");
        assert_eq!(ids.expand("pg.spark40.Twin"), "pg.spark40.Twin");
    }

    #[test]
    fn test_unknown_ids_pass_through() {
        let ids = FxIdNormalizer::default();
        assert_eq!(ids.normalize("other.vendor.Fuzz"), "other.vendor.Fuzz");
        assert_eq!(ids.strip("Fuzz"), "Fuzz");
    }

    #[test]
    fn test_same_effect() {
        let ids = FxIdNormalizer::default();
        assert!(ids.same_effect("pg.spark40.DelayMono", "DelayMono"));
        assert!(ids.same_effect("pg.spark40.bias.reverb.2", "bias.reverb.5"));
        assert!(!ids.same_effect("pg.spark40.DelayMono", "DelayEchoFilt"));
    }

    #[test]
    fn test_custom_namespace() {
        let ids = FxIdNormalizer::new("pg.spark2.");
        assert_eq!(ids.normalize("pg.spark2.Booster"), "Booster");
        assert_eq!(ids.expand("Booster"), "pg.spark2.Booster");
    }

    proptest! {
        #[test]
        fn prop_round_trip_outside_reverb(bare in "[A-Za-z][A-Za-z0-9._]{0,24}") {
            let ids = FxIdNormalizer::default();
            prop_assume!(!ids.strip(&bare).starts_with(REVERB_FAMILY));
            let device_id = ids.expand(&bare);
            prop_assert_eq!(ids.expand(&ids.normalize(&device_id)), device_id);
        }
    }
}
