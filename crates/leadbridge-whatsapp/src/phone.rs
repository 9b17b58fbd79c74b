// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone normalization and contact matching.
//!
//! Brazilian numbers reach the bridge in many shapes: with or without the
//! `55` country code, and with or without the ninth mobile digit added in
//! 2012-2016. Everything here works on digit strings and treats those
//! shapes as the same contact.

use std::collections::BTreeSet;

use leadbridge_config::model::PhoneConfig;

/// Equivalent digit strings for one phone. Used for comparison only.
pub type PhoneVariantSet = BTreeSet<String>;

/// Below this many digits a number is too short to match by anything but equality.
const MIN_MATCH_DIGITS: usize = 10;

/// Strip every non-digit character.
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Phone matching rules for one deployment region.
#[derive(Debug, Clone)]
pub struct PhoneMatcher {
    country_code: String,
    suffix_match: bool,
}

impl Default for PhoneMatcher {
    fn default() -> Self {
        Self::new("55", true)
    }
}

impl PhoneMatcher {
    pub fn new(country_code: impl Into<String>, suffix_match: bool) -> Self {
        Self {
            country_code: country_code.into(),
            suffix_match,
        }
    }

    pub fn from_config(config: &PhoneConfig) -> Self {
        Self::new(config.country_code.clone(), config.suffix_match)
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// National part of `digits`: the country code is removed only when what
    /// remains is still a full national number.
    fn national<'a>(&self, digits: &'a str) -> &'a str {
        match digits.strip_prefix(self.country_code.as_str()) {
            Some(rest) if rest.len() >= MIN_MATCH_DIGITS => rest,
            _ => digits,
        }
    }

    /// Every digit string considered equivalent to `raw`.
    pub fn variants(&self, raw: &str) -> PhoneVariantSet {
        let digits = normalize(raw);
        let mut set = PhoneVariantSet::new();
        if digits.is_empty() {
            return set;
        }

        let national = self.national(&digits);
        let mut nationals = vec![national.to_string()];
        if national.len() == 11 && national.as_bytes()[2] == b'9' {
            nationals.push(format!("{}{}", &national[..2], &national[3..]));
        }
        if national.len() == 10 {
            nationals.push(format!("{}9{}", &national[..2], &national[2..]));
        }

        set.insert(digits.clone());
        for n in nationals {
            set.insert(format!("{}{n}", self.country_code));
            set.insert(n);
        }
        set
    }

    /// Whether `a` and `b` denote the same contact.
    ///
    /// Equal digits always match. Otherwise both must have at least ten digits,
    /// and some variant pair must be equal or, when suffix matching is on,
    /// one must end with the other.
    pub fn same_contact(&self, a: &str, b: &str) -> bool {
        let da = normalize(a);
        let db = normalize(b);
        if da.is_empty() || db.is_empty() {
            return false;
        }
        if da == db {
            return true;
        }
        if da.len() < MIN_MATCH_DIGITS || db.len() < MIN_MATCH_DIGITS {
            return false;
        }

        let va = self.variants(&da);
        let vb = self.variants(&db);
        va.iter().any(|x| {
            vb.iter().any(|y| {
                x == y || (self.suffix_match && (x.ends_with(y.as_str()) || y.ends_with(x.as_str())))
            })
        })
    }

    /// Canonical form used whenever a phone is stored or dialed: country code
    /// present and the ninth mobile digit inserted into ten-digit national
    /// numbers. Strings that do not look national are returned as digits.
    pub fn ensure_country_code(&self, raw: &str) -> String {
        let digits = normalize(raw);
        let cc = self.country_code.as_str();
        let national = match digits.len() {
            10 | 11 => digits.as_str(),
            12 | 13 if digits.starts_with(cc) => &digits[cc.len()..],
            _ => return digits,
        };
        if national.len() == 10 {
            format!("{cc}{}9{}", &national[..2], &national[2..])
        } else if national.len() == 11 {
            format!("{cc}{national}")
        } else {
            digits
        }
    }

    /// Canonical digits for a destination address.
    pub fn format_for_send(&self, raw: &str) -> String {
        self.ensure_country_code(raw)
    }

    /// 10 or 11 digits, or 12-13 digits beginning with the country code.
    pub fn is_phone_shaped(&self, digits: &str) -> bool {
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        match digits.len() {
            10 | 11 => true,
            12 | 13 => digits.starts_with(self.country_code.as_str()),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn m() -> PhoneMatcher {
        PhoneMatcher::default()
    }

    #[test]
    fn normalize_strips_formatting() {
        assert_eq!(normalize("+55 (11) 98765-4321"), "5511987654321");
        assert_eq!(normalize("5511987654321@s.whatsapp.net"), "5511987654321");
        assert_eq!(normalize("abc"), "");
    }

    #[test]
    fn variants_cover_country_code_and_ninth_digit() {
        let v = m().variants("11987654321");
        for expected in ["11987654321", "5511987654321", "1187654321", "551187654321"] {
            assert!(v.contains(expected), "missing {expected} in {v:?}");
        }

        let v = m().variants("551187654321");
        for expected in ["1187654321", "11987654321", "5511987654321"] {
            assert!(v.contains(expected), "missing {expected} in {v:?}");
        }
    }

    #[test]
    fn same_contact_examples() {
        assert!(m().same_contact("11987654321", "5511987654321"));
        assert!(m().same_contact("1187654321", "5511987654321"));
        assert!(m().same_contact("+55 11 98765-4321", "5511987654321"));
        assert!(!m().same_contact("123", "456"));
        assert!(m().same_contact("123", "123"));
        assert!(!m().same_contact("", ""));
        assert!(!m().same_contact("5511987654321", "5521912345678"));
    }

    #[test]
    fn suffix_match_is_configurable() {
        let strict = PhoneMatcher::new("55", false);
        // A foreign prefix in front of a Brazilian national number.
        assert!(m().same_contact("0011987654321", "11987654321"));
        assert!(!strict.same_contact("0011987654321", "11987654321"));
        assert!(strict.same_contact("1187654321", "5511987654321"));
    }

    #[test]
    fn format_for_send_inserts_ninth_digit_and_country_code() {
        assert_eq!(m().format_for_send("1187654321"), "5511987654321");
        assert_eq!(m().format_for_send("11987654321"), "5511987654321");
        assert_eq!(m().format_for_send("551187654321"), "5511987654321");
        assert_eq!(m().format_for_send("5511987654321"), "5511987654321");
    }

    #[test]
    fn ensure_country_code_leaves_other_shapes_alone() {
        // LID digits and short codes pass through untouched.
        assert_eq!(m().ensure_country_code("123456789012345"), "123456789012345");
        assert_eq!(m().ensure_country_code("4004"), "4004");
        assert_eq!(m().ensure_country_code("441234567890"), "441234567890");
    }

    #[test]
    fn phone_shape() {
        assert!(m().is_phone_shaped("1187654321"));
        assert!(m().is_phone_shaped("11987654321"));
        assert!(m().is_phone_shaped("551187654321"));
        assert!(m().is_phone_shaped("5511987654321"));
        assert!(!m().is_phone_shaped("441234567890"));
        assert!(!m().is_phone_shaped("123456789012345"));
        assert!(!m().is_phone_shaped("987654321"));
        assert!(!m().is_phone_shaped(""));
    }

    #[test]
    fn area_code_55_is_not_taken_for_the_country_code() {
        // Landline in area 55: stripping "55" would leave only eight digits.
        let v = m().variants("5523456789");
        for expected in ["5523456789", "555523456789", "55923456789", "5555923456789"] {
            assert!(v.contains(expected), "missing {expected} in {v:?}");
        }
        assert_eq!(m().ensure_country_code("5523456789"), "5555923456789");
        assert_eq!(m().ensure_country_code("55987654321"), "5555987654321");
        assert!(m().same_contact("5523456789", "5555923456789"));
        assert!(!m().same_contact("5523456789", "23456789"));
    }

    fn area() -> impl Strategy<Value = u32> {
        prop_oneof![Just(55u32), 11u32..=99]
    }

    /// Eleven-digit mobile: area code, 9, then eight digits starting 6-9.
    fn mobile() -> impl Strategy<Value = String> {
        (area(), 6u32..=9, 0u32..10_000_000)
            .prop_map(|(area, first, rest)| format!("{area}9{first}{rest:07}"))
    }

    /// Ten-digit number whose third digit is not 9: a landline or a pre-2016 mobile.
    fn landline() -> impl Strategy<Value = String> {
        (area(), 2u32..=8, 0u32..10_000_000)
            .prop_map(|(area, first, rest)| format!("{area}{first}{rest:07}"))
    }

    fn national() -> impl Strategy<Value = String> {
        prop_oneof![mobile(), landline()]
    }

    proptest! {
        #[test]
        fn same_contact_reflexive_and_symmetric_over_variants(number in national()) {
            let matcher = m();
            let variants: Vec<String> = matcher.variants(&number).into_iter().collect();
            prop_assert!(variants.len() >= 4, "{variants:?}");
            for a in &variants {
                prop_assert!(matcher.same_contact(a, a));
                for b in &variants {
                    prop_assert!(matcher.same_contact(a, b), "{a} vs {b}");
                    prop_assert_eq!(matcher.same_contact(a, b), matcher.same_contact(b, a));
                }
            }
        }

        #[test]
        fn ten_digit_number_matches_its_ninth_digit_form(number in landline()) {
            let matcher = m();
            let with_nine = format!("{}9{}", &number[..2], &number[2..]);
            prop_assert!(matcher.same_contact(&number, &with_nine));
            let with_country = format!("55{number}");
            prop_assert!(matcher.same_contact(&with_country, &with_nine));
            prop_assert_eq!(
                matcher.ensure_country_code(&number),
                matcher.ensure_country_code(&with_nine)
            );
        }

        #[test]
        fn canonical_form_is_idempotent(number in national()) {
            let matcher = m();
            let once = matcher.ensure_country_code(&number);
            prop_assert_eq!(once.len(), 13);
            prop_assert!(once.starts_with("55"));
            prop_assert_eq!(matcher.ensure_country_code(&once), once.clone());
            prop_assert!(matcher.same_contact(&once, &number));
        }
    }
}
