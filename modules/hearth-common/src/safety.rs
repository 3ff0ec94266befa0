use std::sync::LazyLock;

use regex::Regex;

use crate::types::ViolationKind;

/// One payment signal found in rendered page content. Any signal aborts an
/// automated registration attempt, regardless of the event's declared cost.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSignal {
    pub kind: ViolationKind,
    pub matched: String,
}

static PAYMENT_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(credit card|debit card|card number|cardholder|billing address|billing info(?:rmation)?|cvv|cvc|security code|expir(?:y|ation) date|payment method|pay now|checkout total|purchase)\b",
    )
    .unwrap()
});

/// Visible price text like "$10", "$12.50", "$1,200". A literal $0 or $0.00
/// does not count as a payment signal.
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*([0-9][0-9,]*)(?:\.([0-9]{2}))?").unwrap());

/// Substrings of element markup used by common payment processors and
/// checkout forms. Matched case-insensitively against raw rendered content.
const PAYMENT_FIELD_SELECTORS: &[&str] = &[
    "cc-number",
    "cc-exp",
    "cc-csc",
    "card-number",
    "cardnumber",
    "name=\"cvv\"",
    "name=\"cvc\"",
    "id=\"cvv\"",
    "stripe.com",
    "js.stripe.com",
    "braintree",
    "paypal.com/sdk",
    "squareup.com",
    "data-checkout",
];

/// Scan rendered page content for payment signals: keywords, known payment
/// field selectors, and visible nonzero price text. Returns every finding.
pub fn detect_payment_signals(content: &str) -> Vec<PaymentSignal> {
    let mut findings = Vec::new();

    if let Some(m) = PAYMENT_KEYWORD_RE.find(content) {
        findings.push(PaymentSignal {
            kind: ViolationKind::PaymentKeyword,
            matched: m.as_str().to_string(),
        });
    }

    let lower = content.to_lowercase();
    if let Some(selector) = PAYMENT_FIELD_SELECTORS
        .iter()
        .find(|s| lower.contains(*s))
    {
        findings.push(PaymentSignal {
            kind: ViolationKind::PaymentFieldSelector,
            matched: (*selector).to_string(),
        });
    }

    for caps in PRICE_RE.captures_iter(content) {
        let dollars: u64 = caps[1].replace(',', "").parse().unwrap_or(0);
        let cents: u64 = caps
            .get(2)
            .map(|c| c.as_str().parse().unwrap_or(0))
            .unwrap_or(0);
        if dollars > 0 || cents > 0 {
            findings.push(PaymentSignal {
                kind: ViolationKind::VisiblePrice,
                matched: caps[0].trim().to_string(),
            });
            break;
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_payment_keyword() {
        let findings = detect_payment_signals("Enter your credit card to reserve your spot");
        assert!(findings
            .iter()
            .any(|f| f.kind == ViolationKind::PaymentKeyword));
    }

    #[test]
    fn detects_payment_field_selector() {
        let html = r#"<input autocomplete="cc-number" type="text">"#;
        let findings = detect_payment_signals(html);
        assert!(findings
            .iter()
            .any(|f| f.kind == ViolationKind::PaymentFieldSelector));
    }

    #[test]
    fn detects_visible_price() {
        let findings = detect_payment_signals("Admission: $10 per child");
        assert!(findings.iter().any(|f| f.kind == ViolationKind::VisiblePrice));
    }

    #[test]
    fn detects_price_with_cents_and_commas() {
        let findings = detect_payment_signals("Season pass $1,250.00");
        let price = findings
            .iter()
            .find(|f| f.kind == ViolationKind::VisiblePrice)
            .unwrap();
        assert_eq!(price.matched, "$1,250.00");
    }

    #[test]
    fn zero_price_is_not_a_signal() {
        let findings = detect_payment_signals("Cost: $0.00 — free for members");
        assert!(findings.is_empty());
    }

    #[test]
    fn clean_registration_page_has_no_signals() {
        let html = "<form><label>Child name</label><input name=\"child_name\">\
                    <label>Email</label><input name=\"email\"><button>Register</button></form>";
        assert!(detect_payment_signals(html).is_empty());
    }

    #[test]
    fn stripe_embed_is_a_selector_signal() {
        let html = r#"<script src="https://js.stripe.com/v3/"></script>"#;
        let findings = detect_payment_signals(html);
        assert!(findings
            .iter()
            .any(|f| f.kind == ViolationKind::PaymentFieldSelector));
    }
}
