//! End-to-end tests over the composed engine.
//!
//! Calculation → quote → approval chain → delivery, with notifications
//! observed on the bus and the store shared across concurrent callers.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal_macros::dec;

    use quoteforge_core::{CustomerId, Decimal, ProcessStepId, RouteId, UserId};
    use quoteforge_costing::{
        CalculationRequest, CalculationStatus, ProcessRouteDetail, ProcessStep,
        ProductProcessRoute, RouteOrigin, RouteSelection,
    };
    use quoteforge_events::EventBus;
    use quoteforge_quoting::{
        ApprovalStatus, Approver, ApproverRole, ItemInput, QuoteStatus,
    };

    use crate::bootstrap::Engine;
    use crate::config::QuotingConfig;
    use crate::delivery::LogMailer;
    use crate::parameters::InMemoryParameterSource;
    use crate::services::{CreateQuoteRequest, UpdateQuoteRequest};
    use crate::store::{InMemoryQuotingStore, QuoteFilter};

    fn engine(store: &InMemoryQuotingStore) -> Engine {
        Engine::with_store(
            &QuotingConfig::default(),
            Arc::new(store.clone()),
            Arc::new(InMemoryParameterSource::new()),
            Arc::new(LogMailer),
        )
        .unwrap()
    }

    async fn seed_bracket_route(store: &InMemoryQuotingStore) {
        let milling = ProcessStep {
            id: ProcessStepId::new(),
            code: "MILL".to_string(),
            name: "Milling".to_string(),
            setup_time_minutes: dec!(30),
            cycle_time_seconds: dec!(6),
            labor_headcount: dec!(1),
            requires_equipment: false,
            default_equipment_id: None,
        };
        let route = ProductProcessRoute {
            id: RouteId::new(),
            name: "Bracket standard".to_string(),
            product_category: Some("bracket".to_string()),
            origin: RouteOrigin::System,
            is_default: true,
            details: vec![ProcessRouteDetail::new(10, milling.id)],
            created_by: None,
            created_at: Utc::now(),
        };
        store.add_process_step(milling).await;
        store.add_route(route).await;
    }

    fn quote_request(unit_price: Decimal) -> CreateQuoteRequest {
        CreateQuoteRequest {
            inquiry_id: None,
            customer_id: CustomerId::new(),
            cost_calculation_id: None,
            validity_days: Some(14),
            payment_terms: None,
            delivery_terms: None,
            items: vec![ItemInput {
                product_name: "Flange".to_string(),
                specification: None,
                quantity: 1,
                unit: None,
                unit_price: Some(unit_price),
                cost_calculation_id: None,
                notes: None,
            }],
            terms: None,
            use_default_terms: false,
            version_notes: None,
        }
    }

    #[tokio::test]
    async fn calculation_to_sent_quote_publishes_lifecycle_events() {
        let store = InMemoryQuotingStore::new();
        seed_bracket_route(&store).await;
        let engine = engine(&store);
        let bus = Arc::clone(&engine.notifications);
        let subscription = bus.subscribe();
        let estimator = UserId::new();

        let calc = engine
            .costing
            .calculate(
                CalculationRequest {
                    inquiry_id: None,
                    product_name: "Bracket".to_string(),
                    product_category: Some("bracket".to_string()),
                    quantity: 100,
                    material_cost: dec!(250),
                    margin_percentage: None,
                    route: RouteSelection::CategoryDefault,
                    notes: None,
                },
                estimator,
            )
            .await
            .unwrap();
        engine.costing.submit_calculation(calc.id, estimator).await.unwrap();
        let calc = engine
            .costing
            .approve_calculation(calc.id, UserId::new())
            .await
            .unwrap();
        assert_eq!(calc.status(), CalculationStatus::Approved);

        let mut request = quote_request(dec!(0));
        request.cost_calculation_id = Some(calc.id);
        request.items[0].quantity = 100;
        request.items[0].unit_price = None;
        request.items[0].cost_calculation_id = Some(calc.id);
        let created = engine.quotes.create_quote(request, estimator).await.unwrap();
        let id = created.quote.header().id;
        assert_eq!(
            created.quote.total_amount(),
            calc.unit_selling_price() * Decimal::from(100)
        );

        engine.quotes.submit_quote(id, estimator).await.unwrap();
        let lead = Approver::new(UserId::new(), [ApproverRole::EngineerLead]);
        let approved = engine.quotes.approve_quote(id, &lead, None).await.unwrap();
        assert_eq!(approved.quote.status(), QuoteStatus::Approved);

        let outcome = engine
            .quotes
            .send_quote(id, "purchasing@customer.example", estimator)
            .await
            .unwrap();
        assert!(outcome.is_sent());

        engine.shutdown().await.unwrap();

        let mut received = Vec::new();
        while let Ok(envelope) = subscription.try_recv() {
            assert_eq!(envelope.aggregate_id(), *id.as_uuid());
            assert_eq!(envelope.aggregate_type(), "quote");
            received.push(envelope.event_type().to_string());
        }
        assert_eq!(
            received,
            vec![
                "quote.created",
                "quote.submitted",
                "quote.approved",
                "quote.sent"
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_get_gap_free_numbers() {
        let store = InMemoryQuotingStore::new();
        let engine = engine(&store);
        let quotes = engine.quotes.clone();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let quotes = quotes.clone();
                tokio::spawn(async move {
                    quotes
                        .create_quote(quote_request(dec!(100)), UserId::new())
                        .await
                        .map(|d| d.quote.quote_number().to_string())
                })
            })
            .collect();

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap());
        }

        let unique: HashSet<&String> = numbers.iter().collect();
        assert_eq!(unique.len(), 20);

        let mut suffixes: Vec<u32> = numbers
            .iter()
            .map(|n| n.rsplit('-').next().unwrap().parse().unwrap())
            .collect();
        suffixes.sort_unstable();
        assert_eq!(suffixes, (1..=20).collect::<Vec<u32>>());

        drop(quotes);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_quote_and_no_number_gap() {
        let store = InMemoryQuotingStore::new();
        let engine = engine(&store);

        store.inject_failure("commit");
        assert!(
            engine
                .quotes
                .create_quote(quote_request(dec!(100)), UserId::new())
                .await
                .is_err()
        );
        store.clear_failures();

        assert!(
            engine
                .quotes
                .list_quotes(&QuoteFilter::default())
                .await
                .unwrap()
                .is_empty()
        );
        let created = engine
            .quotes
            .create_quote(quote_request(dec!(100)), UserId::new())
            .await
            .unwrap();
        assert!(created.quote.quote_number().ends_with("-0001"));
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn approval_levels_follow_the_amount_tiers() {
        let store = InMemoryQuotingStore::new();
        let engine = engine(&store);
        let actor = UserId::new();

        for (amount, levels) in [
            (dec!(9999.99), 1),
            (dec!(10000), 2),
            (dec!(49999.99), 2),
            (dec!(50000), 3),
        ] {
            let created = engine
                .quotes
                .create_quote(quote_request(amount), actor)
                .await
                .unwrap();
            let submitted = engine
                .quotes
                .submit_quote(created.quote.header().id, actor)
                .await
                .unwrap();
            assert_eq!(submitted.approvals.len(), levels, "amount {amount}");
            assert!(
                submitted
                    .approvals
                    .iter()
                    .all(|a| a.status == ApprovalStatus::Pending)
            );
        }

        let pending_gm = engine
            .quotes
            .pending_approvals(ApproverRole::GeneralManager)
            .await
            .unwrap();
        assert_eq!(pending_gm.len(), 1);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn version_numbers_increase_and_one_version_is_current() {
        let store = InMemoryQuotingStore::new();
        let engine = engine(&store);
        let actor = UserId::new();

        let created = engine
            .quotes
            .create_quote(quote_request(dec!(100)), actor)
            .await
            .unwrap();
        let id = created.quote.header().id;

        for price in [dec!(110), dec!(120), dec!(130)] {
            let mut request = quote_request(price);
            request.version_notes = Some(format!("repriced at {price}"));
            engine
                .quotes
                .update_quote(
                    id,
                    UpdateQuoteRequest {
                        items: Some(request.items),
                        new_version: true,
                        version_notes: request.version_notes,
                        ..UpdateQuoteRequest::default()
                    },
                    actor,
                )
                .await
                .unwrap();
        }

        let versions = engine.quotes.list_versions(id).await.unwrap();
        let numbers: Vec<u32> = versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(versions.iter().filter(|v| v.is_current).count(), 1);
        assert!(versions[3].is_current);

        let detail = engine.quotes.get_quote(id).await.unwrap();
        assert_eq!(detail.quote.total_amount(), dec!(130));
        assert_eq!(detail.version.id, versions[3].id);
        engine.shutdown().await.unwrap();
    }
}
