pub use tokio_modbus::{Address, Quantity};

/// 16-bit value stored in Modbus register.
pub type Word = u16;

/// Round `value` to `decimals` decimal places, halves away from zero.
pub fn round_to(value: f64, decimals: u8) -> f64 {
    let factor = 10f64.powi(i32::from(decimals));
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(2300.0 * 0.1, 1), 230.0);
        assert_eq!(round_to(10.0 * 0.01, 1), 0.1);
        assert_eq!(round_to(14.0 * 0.01, 1), 0.1);
        assert_eq!(round_to(0.25, 1), 0.3);
        assert_eq!(round_to(1234.0 * 0.001, 3), 1.234);
        assert_eq!(round_to(65536.0 + 7.0, 0), 65543.0);
    }
}
