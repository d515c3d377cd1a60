mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{Customer, Order, configurator, persist_customer, settings, shop};
use garasu::prelude::*;
use garasu::{Dialect, MemoryEngine};

#[test]
fn references_resolve_regardless_of_declaration_order() {
    let (_engine, app) = shop();
    let order = app.registry().table("order").unwrap();

    let column = order.column("customer_id").unwrap();
    assert!(column.nullable);
    assert_eq!(column.sql_type, SqlType::Char(10));

    assert_eq!(order.foreign_keys.len(), 1);
    let fk = &order.foreign_keys[0];
    assert_eq!(fk.columns, vec!["customer_id"]);
    assert_eq!(fk.referred_table, "customer");
    assert_eq!(fk.referred_columns, vec!["id"]);

    assert_eq!(app.resolve_report().resolved, 1);
    assert_eq!(app.bind_report().created, vec!["customer", "order"]);
}

#[test]
fn undeclared_remote_aborts_startup() {
    let mut config = Configurator::new(settings());
    config.add_entity::<Order>().unwrap();
    let err = config.commit().unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("Customer"));
}

#[test]
fn surrogate_key_is_known_before_flush() {
    let (engine, app) = shop();
    let uow = app.unit_of_work();
    let customer = uow.db().add(Customer::new("Ada Lovelace")).unwrap();
    assert_eq!(customer.id().len(), 10);
    assert_eq!(customer.slug.get(), Some("ada-lovelace"));
    assert_eq!(engine.row_count("customer"), 0);

    uow.commit().unwrap();
    assert_eq!(engine.row_count("customer"), 1);
}

#[test]
fn timestamps_are_set_on_insert_and_refreshed_on_update() {
    let (_engine, app) = shop();
    let id = persist_customer(&app, "Grace Hopper").id.unwrap();

    let uow = app.unit_of_work();
    let stored: Customer = uow.db().get(id.clone()).unwrap().unwrap();
    let created = stored.created.unwrap();
    let modified = stored.modified.unwrap();
    assert!(modified >= created);

    std::thread::sleep(Duration::from_millis(5));
    let mut renamed = stored;
    renamed.name = "Rear Admiral Hopper".into();
    uow.db().add(renamed).unwrap();
    uow.commit().unwrap();

    let after: Customer = app.unit_of_work().db().get(id).unwrap().unwrap();
    assert_eq!(after.name, "Rear Admiral Hopper");
    assert_eq!(after.created, Some(created));
    assert!(after.modified.unwrap() > modified);
}

#[test]
fn duplicate_slug_is_an_integrity_error_and_not_retried() {
    let (engine, app) = shop();
    persist_customer(&app, "Ada Lovelace");

    let attempts = AtomicUsize::new(0);
    let err = app
        .run(|uow| {
            attempts.fetch_add(1, Ordering::SeqCst);
            uow.db().add(Customer::new("ada   LOVELACE!"))
        })
        .unwrap_err();

    match &err {
        Error::Integrity { table, message } => {
            assert_eq!(table, "customer");
            assert!(message.contains("customer.slug"), "{message}");
        }
        other => panic!("expected integrity error, got {other:?}"),
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(engine.row_count("customer"), 1);
}

#[test]
fn one_session_per_unit_of_work() {
    let (_engine, app) = shop();
    let uow = app.unit_of_work();
    assert!(Arc::ptr_eq(&uow.db(), &uow.db()));

    let other = app.unit_of_work();
    assert!(!Arc::ptr_eq(&uow.db(), &other.db()));

    // Work added through one accessor call is visible through the next.
    let customer = uow.db().add(Customer::new("Edsger")).unwrap();
    assert!(uow.db().contains(&customer));
    assert!(!other.db().contains(&customer));
}

#[test]
fn coordinator_abort_rolls_back_the_session() {
    let (engine, app) = shop();
    let uow = app.unit_of_work();
    uow.db().add(Customer::new("Barbara Liskov")).unwrap();
    uow.abort().unwrap();
    assert_eq!(uow.db().pending_new_count(), 0);
    assert_eq!(engine.row_count("customer"), 0);
}

#[test]
fn abort_after_flush_leaves_storage_untouched() {
    let (engine, app) = shop();
    let uow = app.unit_of_work();
    let customer = uow.db().add(Customer::new("Barbara Liskov")).unwrap();
    uow.db().flush().unwrap();
    assert_eq!(engine.row_count("customer"), 0);

    uow.abort().unwrap();
    assert_eq!(engine.row_count("customer"), 0);
    assert_eq!(engine.open_transaction_count(), 0);
    assert!(!uow.db().contains(&customer));
}

#[test]
fn retried_attempt_does_not_keep_rows_flushed_by_the_failed_one() {
    let (engine, app) = shop();
    let attempts = AtomicUsize::new(0);
    app.run(|uow| {
        let db = uow.db();
        let customer = db.add(Customer::new("Alan Turing"))?;
        db.add(Order::for_customer(&customer, 7))?;
        db.flush()?;
        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(Error::TransientStorage("connection reset".into()));
        }
        Ok(())
    })
    .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(engine.row_count("customer"), 1);
    assert_eq!(engine.row_count("order"), 1);
}

#[test]
fn transient_failures_are_retried_up_to_three_attempts() {
    let (engine, app) = shop();
    engine.inject_transient_failures(2);

    let attempts = AtomicUsize::new(0);
    app.run(|uow| {
        attempts.fetch_add(1, Ordering::SeqCst);
        uow.db().add(Customer::new("Alan Turing"))
    })
    .unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(engine.row_count("customer"), 1);
}

#[test]
fn transient_failures_surface_after_the_last_attempt() {
    let (engine, app) = shop();
    engine.inject_transient_failures(3);

    let attempts = AtomicUsize::new(0);
    let err = app
        .run(|uow| {
            attempts.fetch_add(1, Ordering::SeqCst);
            uow.db().add(Customer::new("Alan Turing"))
        })
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(engine.row_count("customer"), 0);
}

#[test]
fn orders_link_to_their_customer() {
    let (_engine, app) = shop();
    let order_id = app
        .run(|uow| {
            let db = uow.db();
            let customer = db.add(Customer::new("Ada Lovelace"))?;
            let order = db.add(Order::for_customer(&customer, 42))?;
            Ok(order.id.unwrap())
        })
        .unwrap();

    let uow = app.unit_of_work();
    let db = uow.db();
    let order: Order = db.get(order_id).unwrap().unwrap();
    let customer = order.customer.load(db.as_ref()).unwrap().unwrap();
    assert_eq!(customer.name, "Ada Lovelace");

    let orders: Vec<Order> = db.find_by("customer_id", customer.id.clone()).unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].amount, 42);
}

#[test]
fn dangling_reference_is_an_integrity_error() {
    let (engine, app) = shop();
    let ghost = Customer {
        id: Some("0123456789".into()),
        ..Customer::new("Ghost")
    };
    let err = app
        .run(|uow| uow.db().add(Order::for_customer(&ghost, 1)))
        .unwrap_err();
    assert!(matches!(err, Error::Integrity { .. }));
    assert_eq!(engine.row_count("order"), 0);
}

#[test]
fn drop_all_runs_before_create_all() {
    let engine = Arc::new(MemoryEngine::default());
    let app = configurator(settings())
        .commit_with_engine(engine.clone())
        .unwrap();
    persist_customer(&app, "Ada Lovelace");
    assert_eq!(engine.row_count("customer"), 1);

    let rebuilt = configurator(settings().should_drop_all(true))
        .commit_with_engine(engine.clone())
        .unwrap();
    assert_eq!(rebuilt.bind_report().dropped, vec!["order", "customer"]);
    assert_eq!(rebuilt.bind_report().created, vec!["customer", "order"]);
    assert_eq!(engine.row_count("customer"), 0);
}

#[test]
fn flags_off_leave_the_engine_untouched() {
    let engine = Arc::new(MemoryEngine::default());
    let app = configurator(Settings::new())
        .commit_with_engine(engine.clone())
        .unwrap();
    assert!(app.bind_report().created.is_empty());
    assert!(engine.table_names().is_empty());
}

#[test]
fn settings_select_the_engine() {
    let app = configurator(settings().database_url("memory://postgresql"))
        .commit()
        .unwrap();
    assert_eq!(app.engine().dialect(), Dialect::Postgres);
    assert!(app.engine().has_table("order"));
}
