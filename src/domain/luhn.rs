/// Validates an order identifier with the Luhn mod-10 checksum.
///
/// Digits are processed right-to-left; every second digit is doubled, with 9
/// subtracted when the doubled value exceeds 9. The identifier is valid iff
/// the total sum is divisible by 10. Empty input or anything other than
/// ASCII digits is invalid.
pub fn is_valid(id: &str) -> bool {
    if id.is_empty() {
        return false;
    }

    let mut sum = 0u32;
    let mut double = false;
    for ch in id.chars().rev() {
        let Some(digit) = ch.to_digit(10) else {
            return false;
        };

        let mut n = digit;
        if double {
            n *= 2;
            if n > 9 {
                n -= 9;
            }
        }
        sum += n;
        double = !double;
    }

    sum % 10 == 0
}
