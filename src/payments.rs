//! Checkout payment helpers.
//!
//! Cash tender validation and change, and the PromptPay QR payload shown
//! for the transfer method. Transfers are acknowledged manually by the
//! cashier; nothing here talks to a payment gateway.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{PosError, PosResult};

// ---------------------------------------------------------------------------
// Cash tender
// ---------------------------------------------------------------------------

/// Change owed for a cash payment. `received` must cover `total`.
pub fn cash_change(total: Decimal, received: Decimal) -> PosResult<Decimal> {
    if received < total {
        return Err(PosError::validation(format!(
            "Received amount {received} is less than total {total}"
        )));
    }
    Ok(received - total)
}

/// Parse the cashier's typed amount. Blank input is `None`.
pub fn parse_amount(input: &str) -> PosResult<Option<Decimal>> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '฿' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Ok(None);
    }
    let amount: Decimal = cleaned
        .parse()
        .map_err(|_| PosError::validation(format!("Not a valid amount: {input}")))?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(PosError::validation("Amount cannot be negative"));
    }
    Ok(Some(amount))
}

// ---------------------------------------------------------------------------
// PromptPay (EMVCo merchant-presented QR)
// ---------------------------------------------------------------------------

const ID_PAYLOAD_FORMAT: &str = "00";
const ID_POI_METHOD: &str = "01";
const ID_MERCHANT_INFO: &str = "29";
const ID_CURRENCY: &str = "53";
const ID_AMOUNT: &str = "54";
const ID_COUNTRY: &str = "58";
const ID_CRC: &str = "63";

const PAYLOAD_FORMAT_EMV: &str = "01";
const POI_STATIC: &str = "11";
const POI_DYNAMIC: &str = "12";
const PROMPTPAY_AID: &str = "A000000677010111";
const CURRENCY_THB: &str = "764";
const COUNTRY_TH: &str = "TH";

const TARGET_MOBILE: &str = "01";
const TARGET_NATIONAL_ID: &str = "02";
const TARGET_EWALLET: &str = "03";

/// One EMV tag-length-value field. Values are ASCII and under 100 bytes.
fn tlv(id: &str, value: &str) -> String {
    format!("{id}{:02}{value}", value.len())
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF).
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Tag and formatted value for a PromptPay identifier.
fn promptpay_target(id: &str) -> PosResult<(&'static str, String)> {
    let digits: String = id.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        15 => Ok((TARGET_EWALLET, digits)),
        13 => Ok((TARGET_NATIONAL_ID, digits)),
        9 | 10 => {
            let local = digits.strip_prefix('0').unwrap_or(&digits);
            if local.len() != 9 {
                return Err(PosError::validation(format!("Invalid PromptPay phone number: {id}")));
            }
            Ok((TARGET_MOBILE, format!("0066{local}")))
        }
        _ => Err(PosError::validation(format!(
            "PromptPay ID must be a phone number or a 13-digit national ID: {id}"
        ))),
    }
}

/// Build the payload string encoded in the PromptPay QR. With an amount the
/// code is single-use (dynamic); without one the payer types the amount.
pub fn promptpay_payload(id: &str, amount: Option<Decimal>) -> PosResult<String> {
    let (target_tag, target) = promptpay_target(id)?;

    let mut payload = String::new();
    payload.push_str(&tlv(ID_PAYLOAD_FORMAT, PAYLOAD_FORMAT_EMV));
    payload.push_str(&tlv(
        ID_POI_METHOD,
        if amount.is_some() { POI_DYNAMIC } else { POI_STATIC },
    ));
    let merchant = format!("{}{}", tlv("00", PROMPTPAY_AID), tlv(target_tag, &target));
    payload.push_str(&tlv(ID_MERCHANT_INFO, &merchant));
    payload.push_str(&tlv(ID_CURRENCY, CURRENCY_THB));
    payload.push_str(&tlv(ID_COUNTRY, COUNTRY_TH));
    if let Some(amount) = amount {
        if amount <= Decimal::ZERO {
            return Err(PosError::validation("PromptPay amount must be positive"));
        }
        let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        payload.push_str(&tlv(ID_AMOUNT, &format!("{rounded:.2}")));
    }
    payload.push_str(ID_CRC);
    payload.push_str("04");
    let crc = crc16_ccitt(payload.as_bytes());
    payload.push_str(&format!("{crc:04X}"));
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn change_requires_enough_cash() {
        assert_eq!(cash_change(d("230"), d("500")).unwrap(), d("270"));
        assert_eq!(cash_change(d("230"), d("230")).unwrap(), Decimal::ZERO);
        assert!(matches!(
            cash_change(d("230"), d("229.99")),
            Err(PosError::Validation(_))
        ));
    }

    #[test]
    fn parse_amount_accepts_grouped_input() {
        assert_eq!(parse_amount("1,000").unwrap(), Some(d("1000")));
        assert_eq!(parse_amount(" ฿250.50 ").unwrap(), Some(d("250.50")));
        assert_eq!(parse_amount("").unwrap(), None);
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("-5").is_err());
    }

    #[test]
    fn crc_matches_reference_check_value() {
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
    }

    #[test]
    fn static_phone_payload() {
        assert_eq!(
            promptpay_payload("081-234-5678", None).unwrap(),
            "00020101021129370016A0000006770101110113006681234567853037645802TH6304823E"
        );
    }

    #[test]
    fn dynamic_payload_carries_amount() {
        assert_eq!(
            promptpay_payload("0812345678", Some(d("150"))).unwrap(),
            "00020101021229370016A0000006770101110113006681234567853037645802TH5406150.00630466EF"
        );
    }

    #[test]
    fn national_id_payload() {
        assert_eq!(
            promptpay_payload("1234567890123", None).unwrap(),
            "00020101021129370016A0000006770101110213123456789012353037645802TH630433FC"
        );
    }

    #[test]
    fn rejects_unusable_ids_and_amounts() {
        assert!(promptpay_payload("12345", None).is_err());
        assert!(promptpay_payload("0812345678", Some(Decimal::ZERO)).is_err());
    }
}
