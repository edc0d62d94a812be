//! Quantified properties of the kernel, the aggregate and the export state machine

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

use valuation_engine::kernel::{
    compound_factor, monte_carlo, present_value, sensitivity_matrix, terminal_value_gordon,
};
use valuation_engine::model::{
    Actor, ExportStatus, ExportType, NewComparable, NewValuation, TerminalMethod, ValuationUpdate,
};
use valuation_engine::store::in_transaction;
use valuation_engine::{
    EngineConfig, ExportLedger, ExportRequest, InMemoryObjectStore, InMemoryStore, ValuationError,
    ValuationService, ValuationStore,
};

fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=3000).prop_map(|bp| Decimal::new(bp, 4))
}

fn cash_flows_strategy() -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec((-1_000_000i64..5_000_000).prop_map(Decimal::from), 0..10)
}

fn status_strategy() -> impl Strategy<Value = ExportStatus> {
    prop_oneof![
        Just(ExportStatus::Queued),
        Just(ExportStatus::Processing),
        Just(ExportStatus::Completed),
        Just(ExportStatus::Failed),
    ]
}

fn base_valuation(rate: Decimal, growth: Decimal, net_debt: Decimal, shares: Option<Decimal>) -> NewValuation {
    NewValuation {
        deal_id: "deal-1".to_string(),
        forecast_years: Some(5),
        discount_rate: rate,
        terminal_method: TerminalMethod::GordonGrowth,
        terminal_growth_rate: Some(growth),
        terminal_ebitda_multiple: None,
        cash_flows: vec![
            Decimal::from(500_000),
            Decimal::from(650_000),
            Decimal::from(800_000),
        ],
        terminal_cash_flow: Decimal::from(900_000),
        net_debt,
        shares_outstanding: shares,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn test_present_value_matches_definition(flows in cash_flows_strategy(), rate in rate_strategy()) {
        let pv = present_value(&flows, rate).unwrap();
        let mut expected = Decimal::ZERO;
        for (t, cf) in flows.iter().enumerate() {
            expected += *cf / compound_factor(rate, t + 1).unwrap();
        }
        prop_assert!((pv - expected).abs() < Decimal::new(1, 6), "pv {} vs {}", pv, expected);
    }

    #[test]
    fn test_gordon_sign(
        cf in -1_000_000i64..1_000_000,
        growth_bp in -500i64..500,
        spread_bp in 1i64..1000,
    ) {
        let cf = Decimal::from(cf);
        let growth = Decimal::new(growth_bp, 4);
        let rate = growth + Decimal::new(spread_bp, 4);
        let tv = terminal_value_gordon(cf, rate, growth).unwrap();
        prop_assert_eq!(tv > Decimal::ZERO, cf * (Decimal::ONE + growth) > Decimal::ZERO);
    }

    #[test]
    fn test_sensitivity_columns_non_increasing(
        wacc_bp in prop::collection::vec(1i64..3000, 2..8),
        growth_bp in prop::collection::vec(-300i64..600, 1..6),
        terminal_cf in 1i64..5_000_000,
        base_ev in 0i64..50_000_000,
    ) {
        let mut wacc_bp = wacc_bp;
        wacc_bp.sort();
        let wacc: Vec<Decimal> = wacc_bp.iter().map(|bp| Decimal::new(*bp, 4)).collect();
        let growth: Vec<Decimal> = growth_bp.iter().map(|bp| Decimal::new(*bp, 4)).collect();
        let matrix = sensitivity_matrix(Decimal::from(base_ev), &wacc, &growth, Decimal::from(terminal_cf));

        for j in 0..growth.len() {
            for i in 1..wacc.len() {
                if let (Some(upper), Some(lower)) = (matrix.cells[i - 1][j], matrix.cells[i][j]) {
                    prop_assert!(lower <= upper, "column {} rows {}..{}", j, i - 1, i);
                }
                if wacc[i] <= growth[j] {
                    prop_assert_eq!(matrix.cells[i][j], None);
                }
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_monte_carlo_bit_identical(
        flows in prop::collection::vec((1i64..2_000_000).prop_map(Decimal::from), 1..6),
        seed in any::<u64>(),
        iterations in 1usize..60,
    ) {
        let rate = Decimal::new(12, 2);
        let growth = Decimal::new(3, 2);
        let a = monte_carlo(&flows, rate, growth, iterations, seed).unwrap();
        let b = monte_carlo(&flows, rate, growth, iterations, seed).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn test_equity_invariant_after_update(
        net_debt in -5_000_000i64..5_000_000,
        shares in prop::option::of(0i64..10_000_000),
        new_debt in prop::option::of(-5_000_000i64..5_000_000),
        new_rate_bp in prop::option::of(400i64..3000),
    ) {
        let store = Arc::new(InMemoryStore::new());
        let service = ValuationService::new(store, EngineConfig::default());
        let created = service
            .create(
                &Actor::new("org-a", "u"),
                base_valuation(Decimal::new(12, 2), Decimal::new(3, 2), Decimal::from(net_debt), shares.map(Decimal::from)),
            )
            .unwrap();
        let update = ValuationUpdate {
            net_debt: new_debt.map(Decimal::from),
            discount_rate: new_rate_bp.map(|bp| Decimal::new(bp, 4)),
            ..Default::default()
        };
        let updated = service.update(created.id, "org-a", update).unwrap();

        for v in [&created, &updated] {
            let m = &v.metrics;
            prop_assert_eq!(m.equity_value, m.enterprise_value - v.inputs.net_debt);
            match v.inputs.shares_outstanding.filter(|s| *s > Decimal::ZERO) {
                Some(s) => prop_assert_eq!(
                    m.implied_share_price,
                    Some(service.config().round(m.equity_value / s))
                ),
                None => prop_assert_eq!(m.implied_share_price, None),
            }
        }
    }

    #[test]
    fn test_cross_tenant_child_rejected(owner in "[a-z]{1,8}", intruder in "[a-z]{1,8}") {
        prop_assume!(owner != intruder);
        let store = Arc::new(InMemoryStore::new());
        let service = ValuationService::new(store.clone(), EngineConfig::default());
        let v = service
            .create(
                &Actor::new(owner.clone(), "u"),
                base_valuation(Decimal::new(12, 2), Decimal::new(3, 2), Decimal::ZERO, None),
            )
            .unwrap();
        let result = service.add_comparable(
            v.id,
            &owner,
            NewComparable {
                organization_id: intruder,
                company_name: "Peer".to_string(),
                ev_revenue_multiple: None,
                ev_ebitda_multiple: Some(Decimal::from(9)),
                pe_ratio: None,
                weight: Decimal::ONE,
                is_outlier: false,
            },
        );
        prop_assert!(matches!(result, Err(ValuationError::CrossTenantViolation(_))));
        prop_assert_eq!(store.counts().unwrap().comparables, 0);
    }

    #[test]
    fn test_export_status_follows_graph(targets in prop::collection::vec(status_strategy(), 1..8)) {
        let store = Arc::new(InMemoryStore::new());
        let config = EngineConfig::default();
        let service = ValuationService::new(store.clone(), config.clone());
        let actor = Actor::new("org-a", "u");
        let v = service
            .create(&actor, base_valuation(Decimal::new(12, 2), Decimal::new(3, 2), Decimal::ZERO, None))
            .unwrap();
        let ledger = ExportLedger::new(
            store.clone(),
            Arc::new(InMemoryObjectStore::new("https://files.local")),
            Arc::new(valuation_engine::export::JsonReportRenderer),
            config,
        );
        let mut log = ledger
            .log_export(
                &actor,
                ExportRequest {
                    valuation_id: v.id,
                    export_type: ExportType::Excel,
                    export_format: String::new(),
                    scenario_id: None,
                    document_id: None,
                },
            )
            .unwrap();

        for target in targets {
            let current = log.status;
            let mut next = log.clone();
            next.status = target;
            let store_ref: &dyn ValuationStore = &*store;
            let result = in_transaction(store_ref, |tx| tx.update_export_log(&next, current));
            let legal = target == current || current.can_transition_to(target);
            prop_assert_eq!(result.is_ok(), legal, "{} -> {}", current, target);
            if legal {
                log = next;
            }
            let stored = ledger.get_export_log(log.id, "org-a").unwrap();
            prop_assert_eq!(stored.status, log.status);
        }
    }
}
