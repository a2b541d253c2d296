//! Checks a [`crate::keymap::BehaviorBinding`]'s parameters against its
//! behavior's declared [`ParameterMetadata`].

use crate::behavior::{CustomParamSet, ParamMatcher, ParameterMetadata, StandardDomain};
use crate::registry::BehaviorRegistry;
use lokey::Error;

/// Largest valid usage ID on the keyboard page, recovered from ZMK's NKRO
/// usage bound (`behavior.c`'s `validate_hid_usage`).
pub const KEYBOARD_PAGE_MAX_USAGE: u16 = 0xDD;
/// Largest valid usage ID on the consumer page.
pub const CONSUMER_PAGE_MAX_USAGE: u16 = 0xFFF;

const HID_PAGE_KEYBOARD: u16 = 0x07;
const HID_PAGE_CONSUMER: u16 = 0x0C;

/// Validates `binding`'s behavior resolves and its parameters satisfy the
/// behavior's declared metadata.
pub fn validate_binding(
    registry: &BehaviorRegistry,
    behavior_name: &str,
    param1: u32,
    param2: u32,
    layer_count: u32,
) -> Result<(), Error> {
    let behavior = registry.resolve_by_name(behavior_name).ok_or(Error::UnknownBehavior)?;
    validate_parameters(behavior.parameter_metadata, param1, param2, layer_count)
}

pub fn validate_parameters(
    metadata: &ParameterMetadata,
    param1: u32,
    param2: u32,
    layer_count: u32,
) -> Result<(), Error> {
    let ok = match metadata {
        ParameterMetadata::Standard { param1: d1, param2: d2 } => {
            validate_standard_domain(*d1, param1, layer_count)
                && validate_standard_domain(*d2, param2, layer_count)
        }
        ParameterMetadata::Custom(sets) => sets
            .iter()
            .any(|set| set_matches(set, param1, param2, layer_count)),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidParameters)
    }
}

pub fn validate_standard_domain(domain: StandardDomain, value: u32, layer_count: u32) -> bool {
    match domain {
        StandardDomain::Null => value == 0,
        StandardDomain::LayerIndex => value < layer_count,
        StandardDomain::HidUsage => validate_hid_usage(value),
        StandardDomain::Hsv => true,
    }
}

fn validate_hid_usage(value: u32) -> bool {
    let page = (value >> 16) as u16;
    let usage = value as u16;
    match page {
        HID_PAGE_KEYBOARD => (1..=KEYBOARD_PAGE_MAX_USAGE).contains(&usage),
        HID_PAGE_CONSUMER => (1..=CONSUMER_PAGE_MAX_USAGE).contains(&usage),
        _ => false,
    }
}

fn matcher_matches(matcher: &ParamMatcher, value: u32, layer_count: u32) -> bool {
    match *matcher {
        ParamMatcher::Literal(expected) => expected == value,
        ParamMatcher::Range(lo, hi) => (lo..=hi).contains(&value),
        ParamMatcher::Standard(domain) => validate_standard_domain(domain, value, layer_count),
    }
}

/// A position with no declared entries must be zero; otherwise at least one
/// entry must match.
fn position_matches(entries: &[ParamMatcher], value: u32, layer_count: u32) -> bool {
    if entries.is_empty() {
        value == 0
    } else {
        entries.iter().any(|m| matcher_matches(m, value, layer_count))
    }
}

fn set_matches(set: &CustomParamSet, param1: u32, param2: u32, layer_count: u32) -> bool {
    position_matches(set.param1, param1, layer_count) && position_matches(set.param2, param2, layer_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_domain_only_accepts_zero() {
        assert!(validate_standard_domain(StandardDomain::Null, 0, 4));
        assert!(!validate_standard_domain(StandardDomain::Null, 1, 4));
    }

    #[test]
    fn layer_index_domain_checks_bound() {
        assert!(validate_standard_domain(StandardDomain::LayerIndex, 3, 4));
        assert!(!validate_standard_domain(StandardDomain::LayerIndex, 4, 4));
    }

    #[test]
    fn hid_usage_accepts_fixed_page_bounds() {
        let keyboard_a = (HID_PAGE_KEYBOARD as u32) << 16 | 0x04;
        assert!(validate_standard_domain(StandardDomain::HidUsage, keyboard_a, 4));
        let keyboard_oob = (HID_PAGE_KEYBOARD as u32) << 16 | (KEYBOARD_PAGE_MAX_USAGE as u32 + 1);
        assert!(!validate_standard_domain(StandardDomain::HidUsage, keyboard_oob, 4));
        let consumer_vol = (HID_PAGE_CONSUMER as u32) << 16 | 0xE9;
        assert!(validate_standard_domain(StandardDomain::HidUsage, consumer_vol, 4));
        let unknown_page = 0x01u32 << 16 | 0x01;
        assert!(!validate_standard_domain(StandardDomain::HidUsage, unknown_page, 4));
    }

    #[test]
    fn custom_set_requires_a_fully_matching_set() {
        static SETS: [CustomParamSet; 2] = [
            CustomParamSet {
                param1: &[ParamMatcher::Literal(1)],
                param2: &[],
            },
            CustomParamSet {
                param1: &[ParamMatcher::Range(10, 20)],
                param2: &[ParamMatcher::Standard(StandardDomain::LayerIndex)],
            },
        ];
        let metadata = ParameterMetadata::Custom(&SETS);
        assert!(validate_parameters(&metadata, 1, 0, 4).is_ok());
        assert!(validate_parameters(&metadata, 1, 5, 4).is_err());
        assert!(validate_parameters(&metadata, 15, 2, 4).is_ok());
        assert!(validate_parameters(&metadata, 15, 9, 4).is_err());
        assert!(validate_parameters(&metadata, 99, 0, 4).is_err());
    }

    #[test]
    fn custom_position_with_no_entries_must_be_zero() {
        static SETS: [CustomParamSet; 1] = [CustomParamSet {
            param1: &[ParamMatcher::Literal(7)],
            param2: &[],
        }];
        let metadata = ParameterMetadata::Custom(&SETS);
        assert!(validate_parameters(&metadata, 7, 0, 4).is_ok());
        assert!(validate_parameters(&metadata, 7, 1, 4).is_err());
    }
}
