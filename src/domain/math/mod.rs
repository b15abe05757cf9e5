//! Pure AMM math: constant-product swap output and closed-form optimal
//! cycle sizing.
//!
//! `swap_output` is exact decimal arithmetic with a single final floor.
//! The optimizers run in f64 (the square root has no useful fixed-point
//! form); their result is a candidate only and must be re-validated with
//! integer `swap_output` before any trade is sized from it.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Proportional fee taken on the input side of a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRate {
    pub numerator: u64,
    pub denominator: u64,
}

impl FeeRate {
    pub fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Fraction of the input that reaches the curve, e.g. 0.9975
    pub fn keep_f64(&self) -> f64 {
        1.0 - self.numerator as f64 / self.denominator as f64
    }

    fn keep_decimal(&self) -> Option<Decimal> {
        let num = Decimal::from(self.denominator.checked_sub(self.numerator)?);
        num.checked_div(Decimal::from(self.denominator))
    }
}

/// Reserves of one pool oriented in trade direction
#[derive(Debug, Clone, Copy)]
pub struct LegReserves {
    /// Pool reserve of the token being sold
    pub reserve_in: u64,
    /// Pool reserve of the token being bought
    pub reserve_out: u64,
    pub fee: FeeRate,
}

/// Constant-product swap output net of the input-side fee:
/// `floor(amount_in * fee * reserve_out / (reserve_in + fee * amount_in))`.
///
/// Returns 0 on degenerate reserves or arithmetic overflow; a zero output
/// rejects the cycle downstream, which is the safe direction.
pub fn swap_output(amount_in: u64, reserve_in: u64, reserve_out: u64, fee: FeeRate) -> u64 {
    if amount_in == 0 || reserve_in == 0 || reserve_out == 0 {
        return 0;
    }
    swap_output_decimal(amount_in, reserve_in, reserve_out, fee).unwrap_or(0)
}

fn swap_output_decimal(
    amount_in: u64,
    reserve_in: u64,
    reserve_out: u64,
    fee: FeeRate,
) -> Option<u64> {
    let keep = fee.keep_decimal()?;
    let amount_after_fee = Decimal::from(amount_in).checked_mul(keep)?;
    let numerator = amount_after_fee.checked_mul(Decimal::from(reserve_out))?;
    let denominator = Decimal::from(reserve_in).checked_add(amount_after_fee)?;
    numerator.checked_div(denominator)?.floor().to_u64()
}

/// Closed-form profit-maximizing input for a two-pool cycle.
///
/// With `x_i`/`y_i` the out/in reserves of leg *i* and `f_i` the kept fee
/// fraction, the chained output is `x1·x2·f1·f2·a / (y1·y2 + (y2·f1 +
/// x1·f1·f2)·a)`; setting the derivative of `out(a) - a` to zero gives the
/// positive root below. Returns `None` when no positive optimum exists
/// (no mispricing worth trading) or the arithmetic degenerates.
pub fn optimal_input_2hop(l1: &LegReserves, l2: &LegReserves) -> Option<u64> {
    let (x1, y1, f1) = (l1.reserve_out as f64, l1.reserve_in as f64, l1.fee.keep_f64());
    let (x2, y2, f2) = (l2.reserve_out as f64, l2.reserve_in as f64, l2.fee.keep_f64());

    let product = f1 * f2 * x1 * x2 * y1 * y2;
    let root = product.sqrt();
    let amount = (root - y1 * y2) / (f1 * (y2 + f2 * x1));
    positive_amount(amount)
}

/// Closed-form profit-maximizing input for a three-pool cycle, the larger
/// root of the same first-order condition chained once more.
pub fn optimal_input_3hop(l1: &LegReserves, l2: &LegReserves, l3: &LegReserves) -> Option<u64> {
    let (x1, y1, f1) = (l1.reserve_out as f64, l1.reserve_in as f64, l1.fee.keep_f64());
    let (x2, y2, f2) = (l2.reserve_out as f64, l2.reserve_in as f64, l2.fee.keep_f64());
    let (x3, y3, f3) = (l3.reserve_out as f64, l3.reserve_in as f64, l3.fee.keep_f64());

    let product = f1 * f2 * f3 * x1 * x2 * x3 * y1 * y2 * y3;
    let root = product.sqrt();
    let denominator = f1 * (y2 * y3 + f2 * x1 * y3 + f2 * f3 * x1 * x2);
    let amount = (root - y1 * y2 * y3) / denominator;
    positive_amount(amount)
}

fn positive_amount(amount: f64) -> Option<u64> {
    if !amount.is_finite() || amount < 1.0 {
        return None;
    }
    Some(amount.floor() as u64)
}

/// Integer output chain of a cycle for a candidate input
pub fn quote_chain(legs: &[LegReserves], amount_in: u64) -> Vec<u64> {
    let mut outputs = Vec::with_capacity(legs.len());
    let mut amount = amount_in;
    for leg in legs {
        amount = swap_output(amount, leg.reserve_in, leg.reserve_out, leg.fee);
        outputs.push(amount);
    }
    outputs
}

/// Minimum acceptable output under a slippage tolerance in basis points
pub fn min_out(amount_out: u64, slippage_bps: u32) -> u64 {
    let keep = 10_000u128.saturating_sub(slippage_bps as u128);
    (amount_out as u128 * keep / 10_000) as u64
}

/// A candidate trade that survived integer re-validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizedTrade {
    pub amount_in: u64,
    pub outputs: Vec<u64>,
    pub profit: u64,
}

/// Re-validate a float optimum with integer swap math and bound the
/// capital at risk.
///
/// The amount is halved until `amount / profit` stays within `max_ratio`
/// (None disables the clamp for deep-liquidity pools). Returns `None` as
/// soon as the integer chain stops being profitable — float error near
/// the optimum must never size a losing trade.
pub fn size_trade(
    legs: &[LegReserves],
    candidate: u64,
    max_ratio: Option<f64>,
) -> Option<SizedTrade> {
    let mut amount = candidate;
    while amount > 0 {
        let outputs = quote_chain(legs, amount);
        let final_out = *outputs.last()?;
        let profit = final_out.checked_sub(amount).filter(|p| *p > 0)?;

        let within_risk = match max_ratio {
            None => true,
            Some(ratio) => amount as f64 <= ratio * profit as f64,
        };
        if within_risk {
            return Some(SizedTrade {
                amount_in: amount,
                outputs,
                profit,
            });
        }
        amount /= 2;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fee_997() -> FeeRate {
        // 0.3% input-side fee, i.e. 99.7% reaches the curve
        FeeRate::new(3, 1000)
    }

    #[test]
    fn test_swap_output_worked_example() {
        // 1000 in against 2_000_000 input-side / 1_000_000 output-side
        // reserves at fee 0.997 must floor to 498
        let out = swap_output(1000, 2_000_000, 1_000_000, fee_997());
        assert_eq!(out, 498);
    }

    #[test]
    fn test_swap_output_degenerate_reserves() {
        assert_eq!(swap_output(0, 1_000, 1_000, fee_997()), 0);
        assert_eq!(swap_output(100, 0, 1_000, fee_997()), 0);
        assert_eq!(swap_output(100, 1_000, 0, fee_997()), 0);
    }

    #[test]
    fn test_optimal_input_2hop_mispriced_pool() {
        // Pool A balanced, pool B prices the intermediate 5% higher
        let l1 = LegReserves {
            reserve_in: 1_000_000,
            reserve_out: 1_000_000,
            fee: fee_997(),
        };
        let l2 = LegReserves {
            reserve_in: 1_000_000,
            reserve_out: 1_050_000,
            fee: fee_997(),
        };
        let amount = optimal_input_2hop(&l1, &l2).expect("profitable cycle");
        assert!(amount > 0);

        let outputs = quote_chain(&[l1, l2], amount);
        assert!(
            outputs[1] > amount,
            "round trip {} -> {} not profitable",
            amount,
            outputs[1]
        );
    }

    #[test]
    fn test_optimal_input_2hop_is_near_the_maximum() {
        let l1 = LegReserves {
            reserve_in: 1_000_000,
            reserve_out: 1_000_000,
            fee: fee_997(),
        };
        let l2 = LegReserves {
            reserve_in: 1_000_000,
            reserve_out: 1_050_000,
            fee: fee_997(),
        };
        let legs = [l1, l2];
        let amount = optimal_input_2hop(&l1, &l2).unwrap();

        let profit =
            |a: u64| quote_chain(&legs, a).last().copied().unwrap_or(0) as i128 - a as i128;
        let at_opt = profit(amount);
        assert!(at_opt >= profit(amount / 2));
        assert!(at_opt >= profit(amount * 2));
    }

    #[test]
    fn test_optimal_input_2hop_no_arbitrage() {
        // Identical price ratios: fees eat any round trip
        let leg = LegReserves {
            reserve_in: 1_000_000,
            reserve_out: 1_000_000,
            fee: fee_997(),
        };
        assert_eq!(optimal_input_2hop(&leg, &leg), None);
    }

    #[test]
    fn test_optimal_input_3hop_mispriced_triangle() {
        let l1 = LegReserves {
            reserve_in: 1_000_000,
            reserve_out: 1_000_000,
            fee: fee_997(),
        };
        let l2 = LegReserves {
            reserve_in: 2_000_000,
            reserve_out: 2_000_000,
            fee: fee_997(),
        };
        let l3 = LegReserves {
            reserve_in: 1_000_000,
            reserve_out: 1_100_000,
            fee: fee_997(),
        };
        let amount = optimal_input_3hop(&l1, &l2, &l3).expect("profitable triangle");
        let outputs = quote_chain(&[l1, l2, l3], amount);
        assert!(outputs[2] > amount);
    }

    #[test]
    fn test_optimal_input_3hop_balanced_triangle() {
        let leg = LegReserves {
            reserve_in: 1_000_000,
            reserve_out: 1_000_000,
            fee: fee_997(),
        };
        assert_eq!(optimal_input_3hop(&leg, &leg, &leg), None);
    }

    #[test]
    fn test_min_out() {
        assert_eq!(min_out(100_000, 100), 99_000);
        assert_eq!(min_out(100_000, 0), 100_000);
        assert_eq!(min_out(100_000, 20_000), 0);
    }

    #[test]
    fn test_size_trade_rejects_unprofitable_rounding() {
        // A barely-balanced cycle: the float optimum may be positive but
        // the integer chain loses to flooring
        let leg = LegReserves {
            reserve_in: 1_000_000,
            reserve_out: 1_000_001,
            fee: fee_997(),
        };
        assert_eq!(size_trade(&[leg, leg], 1_000, None), None);
    }

    #[test]
    fn test_size_trade_halves_until_risk_bound() {
        let l1 = LegReserves {
            reserve_in: 1_000_000,
            reserve_out: 1_000_000,
            fee: fee_997(),
        };
        let l2 = LegReserves {
            reserve_in: 1_000_000,
            reserve_out: 1_050_000,
            fee: fee_997(),
        };
        let legs = [l1, l2];
        let candidate = optimal_input_2hop(&l1, &l2).unwrap();

        let unclamped = size_trade(&legs, candidate, None).unwrap();
        let clamped = size_trade(&legs, candidate, Some(10.0)).unwrap();
        assert!(clamped.amount_in <= unclamped.amount_in);
        assert!(clamped.amount_in as f64 <= 10.0 * clamped.profit as f64);
    }

    #[test]
    fn test_size_trade_disabled_clamp_keeps_candidate() {
        let l1 = LegReserves {
            reserve_in: 1_000_000,
            reserve_out: 1_000_000,
            fee: fee_997(),
        };
        let l2 = LegReserves {
            reserve_in: 1_000_000,
            reserve_out: 1_050_000,
            fee: fee_997(),
        };
        let candidate = optimal_input_2hop(&l1, &l2).unwrap();
        let sized = size_trade(&[l1, l2], candidate, None).unwrap();
        assert_eq!(sized.amount_in, candidate);
    }

    proptest! {
        // Output can never beat the fee-free spot value:
        // out * reserve_in <= amount_in * reserve_out
        #[test]
        fn prop_swap_output_below_spot(
            amount_in in 1u64..1_000_000_000,
            reserve_in in 1u64..1_000_000_000_000,
            reserve_out in 1u64..1_000_000_000_000,
        ) {
            let out = swap_output(amount_in, reserve_in, reserve_out, fee_997());
            prop_assert!(out as u128 * reserve_in as u128
                <= amount_in as u128 * reserve_out as u128);
        }

        #[test]
        fn prop_swap_output_monotone_in_amount(
            a in 1u64..1_000_000_000,
            b in 1u64..1_000_000_000,
            reserve_in in 1u64..1_000_000_000_000,
            reserve_out in 1u64..1_000_000_000_000,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let fee = fee_997();
            prop_assert!(
                swap_output(lo, reserve_in, reserve_out, fee)
                    <= swap_output(hi, reserve_in, reserve_out, fee)
            );
        }

        #[test]
        fn prop_swap_output_never_drains_pool(
            amount_in in 1u64..u64::MAX / 2,
            reserve_in in 1u64..1_000_000_000_000,
            reserve_out in 1u64..1_000_000_000_000,
        ) {
            let out = swap_output(amount_in, reserve_in, reserve_out, fee_997());
            prop_assert!(out < reserve_out);
        }

        #[test]
        fn prop_swap_output_deterministic(
            amount_in in 1u64..1_000_000_000,
            reserve_in in 1u64..1_000_000_000_000,
            reserve_out in 1u64..1_000_000_000_000,
        ) {
            let fee = fee_997();
            prop_assert_eq!(
                swap_output(amount_in, reserve_in, reserve_out, fee),
                swap_output(amount_in, reserve_in, reserve_out, fee)
            );
        }
    }
}
