use crate::models::PAYMENT_DEPOSIT;

/// Fixed amount paid up front when a customer chooses the deposit option.
pub const DEPOSIT_AMOUNT: i64 = 100;

pub fn total_price(service_price: i64, add_on_prices: &[i64]) -> i64 {
    service_price + add_on_prices.iter().sum::<i64>()
}

/// Advisory balance shown while the customer is choosing a payment method:
/// the deposit is paid immediately, the rest is due later.
pub fn quoted_remaining(total: i64, payment_method: &str) -> i64 {
    if payment_method == PAYMENT_DEPOSIT {
        (total - DEPOSIT_AMOUNT).max(0)
    } else {
        0
    }
}

/// Balance recorded on the receipt at confirmation time. A deposit booking
/// still owes the full total (the deposit covers the reservation, not the
/// service); a full payment owes nothing.
pub fn receipt_remaining(total: i64, payment_method: &str) -> i64 {
    if payment_method == PAYMENT_DEPOSIT {
        total
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PAYMENT_FULL;

    #[test]
    fn total_is_service_plus_add_ons() {
        assert_eq!(total_price(200, &[50, 60]), 310);
    }

    #[test]
    fn total_with_no_add_ons_is_service_price() {
        assert_eq!(total_price(200, &[]), 200);
    }

    #[test]
    fn quoted_remaining_subtracts_deposit() {
        assert_eq!(quoted_remaining(250, PAYMENT_DEPOSIT), 150);
        assert_eq!(quoted_remaining(250, PAYMENT_FULL), 0);
    }

    #[test]
    fn quoted_remaining_never_negative() {
        assert_eq!(quoted_remaining(80, PAYMENT_DEPOSIT), 0);
        assert_eq!(quoted_remaining(100, PAYMENT_DEPOSIT), 0);
    }

    #[test]
    fn receipt_remaining_is_full_total_for_deposit() {
        assert_eq!(receipt_remaining(250, PAYMENT_DEPOSIT), 250);
        assert_eq!(receipt_remaining(250, PAYMENT_FULL), 0);
    }
}
