//! Display formatting for money and timestamps (Thai locale).

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

const THAI_SHORT_MONTHS: [&str; 12] = [
    "ม.ค.", "ก.พ.", "มี.ค.", "เม.ย.", "พ.ค.", "มิ.ย.", "ก.ค.", "ส.ค.", "ก.ย.", "ต.ค.", "พ.ย.", "ธ.ค.",
];

/// Offset between the Gregorian and Buddhist-era year.
const BUDDHIST_ERA_OFFSET: i32 = 543;

/// `฿1,234.50`; negatives as `-฿20.00`.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    format!(
        "{}฿{}.{}",
        if negative { "-" } else { "" },
        group_thousands(int_part),
        frac_part
    )
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `17 ต.ค. 2569 14:30` in the given display offset.
pub fn format_date(at: &DateTime<Utc>, offset: &FixedOffset) -> String {
    let local = at.with_timezone(offset);
    let month = THAI_SHORT_MONTHS[local.month0() as usize];
    format!(
        "{} {} {} {:02}:{:02}",
        local.day(),
        month,
        local.year() + BUDDHIST_ERA_OFFSET,
        local.hour(),
        local.minute()
    )
}
