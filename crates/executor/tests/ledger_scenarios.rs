use chrono::{NaiveDate, NaiveDateTime};
use core_types::{Fill, SecurityState};
use executor::Ledger;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn ts(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 9, day).unwrap().and_hms_opt(11, 0, 0).unwrap()
}

fn ledger() -> Ledger {
    Ledger::new(dec!(1000000), &["SBER".to_string()], &[Decimal::ONE], dec!(0.75)).unwrap()
}

fn trade(quantity: i64, price: Decimal) -> Fill {
    Fill::new("SBER", quantity, price).unwrap()
}

fn sber(ledger: &Ledger) -> &SecurityState {
    ledger.position("SBER").unwrap()
}

fn scenario_a() -> Ledger {
    let mut l = ledger();
    l.apply(&[trade(100, dec!(120))], Some(ts(15))).unwrap();
    l
}

#[test]
fn scenario_a_opening_buy() {
    let l = scenario_a();
    assert_eq!(sber(&l).quantity(), 100);
    assert_eq!(sber(&l).price(), dec!(120));
    assert_eq!(l.free_balance(), dec!(988000));
}

#[test]
fn scenario_b_adding_averages() {
    let mut l = scenario_a();
    l.apply(&[trade(200, dec!(110))], Some(ts(16))).unwrap();
    assert_eq!(sber(&l).quantity(), 300);
    assert_eq!(sber(&l).price(), dec!(113.3333333333333333));
    assert_eq!(sber(&l).price().round_dp(2), dec!(113.33));
}

#[test]
fn scenario_c_full_close_resets_price() {
    let mut l = scenario_a();
    l.apply(&[trade(200, dec!(110))], Some(ts(16))).unwrap();
    let before = l.free_balance();
    l.apply(&[trade(-300, dec!(140))], Some(ts(17))).unwrap();

    assert_eq!(sber(&l).quantity(), 0);
    assert_eq!(sber(&l).price(), Decimal::ZERO);
    assert_eq!(l.free_balance() - before, dec!(42000));
    // The flattened position stays in the map.
    assert!(l.position("SBER").is_some());
}

#[test]
fn scenario_d_flip_takes_incoming_price() {
    let mut l = scenario_a();
    l.apply(&[trade(-150, dec!(100))], Some(ts(16))).unwrap();
    assert_eq!(sber(&l).quantity(), -50);
    assert_eq!(sber(&l).price(), dec!(100));
}

#[test]
fn history_structures_are_detached_copies() {
    let mut l = scenario_a();
    l.apply(&[trade(200, dec!(110))], Some(ts(16))).unwrap();

    let entries = l.history().entries();
    assert_eq!(entries.len(), 2);
    assert!(l.history().is_contiguous());

    let first = &entries[0];
    assert_eq!(first.timestamp, ts(15));
    assert!(first.structure_before.is_empty());
    assert_eq!(first.structure_received["SBER"].quantity, 100);
    // Later mutation did not leak into the first entry.
    assert_eq!(first.structure_after["SBER"].quantity, 100);
    assert_eq!(entries[1].structure_before["SBER"].quantity, 100);
    assert_eq!(entries[1].structure_after["SBER"].quantity, 300);
    assert_eq!(entries[1].balance, l.full_balance());

    // Per-position history: initial flat state plus two updates.
    assert_eq!(sber(&l).history().len(), 3);
}

#[test]
fn ledger_round_trips_through_json_with_full_precision() {
    let mut l = scenario_a();
    l.apply(&[trade(200, dec!(110))], Some(ts(16))).unwrap();
    let json = serde_json::to_string(&l).unwrap();
    let back: Ledger = serde_json::from_str(&json).unwrap();
    assert_eq!(back, l);
    assert_eq!(sber(&back).price(), dec!(113.3333333333333333));
}

proptest! {
    #[test]
    fn full_balance_is_always_recomputed(
        trades in prop::collection::vec((-500i64..500, 1i64..100_000, 0i64..1000), 1..40)
    ) {
        let mut l = ledger();
        for (quantity, cents, fee_cents) in trades {
            let fill = Fill::new("SBER", quantity, Decimal::new(cents, 2))
                .unwrap()
                .with_fee(Decimal::new(fee_cents, 2))
                .unwrap();
            l.apply(&[fill], None).unwrap();

            let held: Decimal = l.positions().values().map(|s| s.value()).sum();
            prop_assert_eq!(l.full_balance(), l.free_balance() + held);
            if let Some(state) = l.position("SBER") {
                if state.is_flat() {
                    prop_assert_eq!(state.price(), Decimal::ZERO);
                }
            }
        }
        prop_assert!(l.history().is_contiguous());
    }
}
