/// Dialing metadata for one market: ISO 3166-1 alpha-2 code (lowercase), calling code
/// without the `+`, and the accepted digit count of the national number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Country {
    pub iso: &'static str,
    pub calling_code: &'static str,
    pub min_digits: usize,
    pub max_digits: usize,
}

const fn country(iso: &'static str, calling_code: &'static str, min: usize, max: usize) -> Country {
    Country {
        iso,
        calling_code,
        min_digits: min,
        max_digits: max,
    }
}

// Where a calling code is shared (+1, +7) the first entry is the one assumed when no
// ISO hint disambiguates.
pub static COUNTRIES: &[Country] = &[
    country("us", "1", 10, 10),
    country("ca", "1", 10, 10),
    country("ru", "7", 10, 10),
    country("kz", "7", 10, 10),
    country("eg", "20", 10, 10),
    country("za", "27", 9, 9),
    country("nl", "31", 9, 9),
    country("fr", "33", 9, 9),
    country("es", "34", 9, 9),
    country("it", "39", 9, 10),
    country("gb", "44", 10, 10),
    country("de", "49", 10, 11),
    country("my", "60", 9, 10),
    country("au", "61", 9, 9),
    country("id", "62", 9, 12),
    country("ph", "63", 10, 10),
    country("nz", "64", 8, 10),
    country("sg", "65", 8, 8),
    country("th", "66", 9, 9),
    country("jp", "81", 10, 10),
    country("kr", "82", 9, 10),
    country("vn", "84", 9, 9),
    country("cn", "86", 11, 11),
    country("tr", "90", 10, 10),
    country("in", "91", 10, 10),
    country("pk", "92", 10, 10),
    country("af", "93", 9, 9),
    country("lk", "94", 9, 9),
    country("ir", "98", 10, 10),
    country("ma", "212", 9, 9),
    country("dz", "213", 9, 9),
    country("tn", "216", 8, 8),
    country("ng", "234", 10, 10),
    country("sd", "249", 9, 9),
    country("ke", "254", 9, 9),
    country("ie", "353", 9, 9),
    country("hk", "852", 8, 8),
    country("bd", "880", 10, 10),
    country("lb", "961", 7, 8),
    country("jo", "962", 9, 9),
    country("iq", "964", 10, 10),
    country("kw", "965", 8, 8),
    country("sa", "966", 9, 9),
    country("ye", "967", 9, 9),
    country("om", "968", 8, 8),
    country("ae", "971", 8, 9),
    country("bh", "973", 8, 8),
    country("qa", "974", 8, 8),
    country("np", "977", 10, 10),
];

const MAX_CALLING_CODE_DIGITS: usize = 4;

pub fn by_iso(iso: &str) -> Option<&'static Country> {
    let iso = iso.trim();
    COUNTRIES.iter().find(|c| c.iso.eq_ignore_ascii_case(iso))
}

pub fn by_calling_code(code: &str) -> impl Iterator<Item = &'static Country> + '_ {
    COUNTRIES.iter().filter(move |c| c.calling_code == code)
}

/// Finds the longest known calling code that prefixes `digits` (the number without
/// its `+`). A country matching `iso_hint` is preferred among countries sharing the
/// matched code. Returns the country and the remaining national number.
pub fn match_calling_code<'a>(
    digits: &'a str,
    iso_hint: Option<&str>,
) -> Option<(&'static Country, &'a str)> {
    let longest = digits.len().min(MAX_CALLING_CODE_DIGITS);
    (1..=longest).rev().find_map(|len| {
        let prefix = digits.get(..len)?;
        let mut candidates = by_calling_code(prefix).peekable();
        let first = *candidates.peek()?;
        let chosen = iso_hint
            .and_then(|hint| candidates.find(|c| c.iso.eq_ignore_ascii_case(hint.trim())))
            .unwrap_or(first);
        Some((chosen, &digits[len..]))
    })
}
