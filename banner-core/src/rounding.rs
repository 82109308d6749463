//! Half-up rounding on the decimal representation of a value.
//!
//! `f64::round` and formatting both operate on the binary value, so `14.45`
//! (stored as `14.4499999...`) would display as `14.4`. Readings shown on air
//! must follow the written digits instead: look at the first digit past the
//! kept places and round the magnitude up when it is 5 or more.

/// Round `value` to `decimals` places, half-up on the next decimal digit,
/// symmetric around zero. Non-finite input yields `0.0`.
pub fn round_half_up(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() || value == 0.0 {
        return 0.0;
    }

    // Display for f64 is the shortest round-trip representation and never
    // uses exponent notation.
    let repr = value.abs().to_string();
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    let keep = decimals as usize;

    let mut digits: Vec<u8> = int_part.bytes().map(|b| b - b'0').collect();
    digits.extend(frac_part.bytes().take(keep).map(|b| b - b'0'));
    digits.resize(int_part.len() + keep, 0);

    let next = frac_part.as_bytes().get(keep).map_or(0, |b| b - b'0');
    if next >= 5 {
        increment(&mut digits);
    }

    let int_len = digits.len() - keep;
    let mut text = String::with_capacity(digits.len() + 1);
    for (i, d) in digits.iter().enumerate() {
        if i == int_len {
            text.push('.');
        }
        text.push(char::from(b'0' + d));
    }

    let magnitude: f64 = text.parse().unwrap_or(0.0);
    if magnitude == 0.0 {
        0.0
    } else if value < 0.0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Add one unit in the last place of a big-endian decimal digit string.
fn increment(digits: &mut Vec<u8>) {
    for d in digits.iter_mut().rev() {
        if *d == 9 {
            *d = 0;
        } else {
            *d += 1;
            return;
        }
    }
    digits.insert(0, 1);
}

/// Lenient front-end for textual input. `None`, empty, `"null"` and
/// anything that is not a plain number round to `0.0`.
pub fn round_str(value: Option<&str>, decimals: u32) -> f64 {
    let Some(text) = value.map(str::trim) else {
        return 0.0;
    };
    if text.is_empty() || text.eq_ignore_ascii_case("null") {
        return 0.0;
    }

    text.parse::<f64>()
        .map(|v| round_half_up(v, decimals))
        .unwrap_or(0.0)
}
