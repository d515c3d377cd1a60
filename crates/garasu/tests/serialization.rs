mod common;

use common::{Customer, Order, persist_customer, shop};
use garasu::prelude::*;

fn customer_with_orders(app: &App, amounts: &[i64]) -> String {
    app.run(|uow| {
        let db = uow.db();
        let customer = db.add(Customer::new("Ada Lovelace"))?;
        for amount in amounts {
            db.add(Order::for_customer(&customer, *amount))?;
        }
        Ok(customer.id.unwrap_or_default())
    })
    .unwrap()
}

#[test]
fn eager_children_are_serialized_in_order() {
    let (_engine, app) = shop();
    let id = customer_with_orders(&app, &[10, 20]);

    let uow = app.unit_of_work();
    let customer: Customer = uow.db().get(id.clone()).unwrap().unwrap();
    assert!(!customer.orders.is_loaded());

    let json = uow.serialize(&customer).unwrap();
    assert_eq!(json["id"], id.as_str());
    assert_eq!(json["slug"], "ada-lovelace");
    let amounts: Vec<i64> = json["orders"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["amount"].as_i64().unwrap())
        .collect();
    assert_eq!(amounts, vec![10, 20]);
    assert!(customer.orders.is_loaded());
}

#[test]
fn blacklisted_fields_are_omitted() {
    let (_engine, app) = shop();
    let id = persist_customer(&app, "Grace Hopper").id.unwrap();

    let uow = app.unit_of_work();
    let customer: Customer = uow.db().get(id).unwrap().unwrap();
    let json = uow.serialize(&customer).unwrap();
    let object = json.as_object().unwrap();

    assert!(!object.contains_key("rank"));
    assert!(!object.contains_key("modified"));
    assert_eq!(json["viewed"], 0);
    assert_eq!(json["orders"], serde_json::json!([]));
}

#[test]
fn timestamps_render_as_iso_8601() {
    let (_engine, app) = shop();
    let id = persist_customer(&app, "Grace Hopper").id.unwrap();

    let uow = app.unit_of_work();
    let customer: Customer = uow.db().get(id).unwrap().unwrap();
    let json = uow.serialize(&customer).unwrap();
    let created = json["created"].as_str().unwrap();
    assert_eq!(&created[4..5], "-");
    assert_eq!(&created[10..11], "T");
}

#[test]
fn loaded_non_eager_relation_is_described() {
    let (_engine, app) = shop();
    customer_with_orders(&app, &[5]);

    let uow = app.unit_of_work();
    let db = uow.db();
    let orders: Vec<Order> = db.find_by("amount", 5_i64).unwrap();
    let order = &orders[0];

    let json = uow.serialize(order).unwrap();
    assert!(json.get("customer").is_none());

    order.customer.load(db.as_ref()).unwrap();
    let json = uow.serialize(order).unwrap();
    assert_eq!(json["customer"], "<Customer ada-lovelace>");
}

#[test]
fn render_json_produces_text() {
    let (_engine, app) = shop();
    let id = persist_customer(&app, "Ada Lovelace").id.unwrap();

    let uow = app.unit_of_work();
    let customer: Customer = uow.db().get(id).unwrap().unwrap();
    let text = uow.render_json(&customer).unwrap();
    assert!(text.contains(r#""name":"Ada Lovelace""#), "{text}");
}

#[test]
fn unloaded_eager_relation_without_session_fails() {
    let (_engine, app) = shop();
    let id = persist_customer(&app, "Ada Lovelace").id.unwrap();

    let customer: Customer = app.unit_of_work().db().get(id).unwrap().unwrap();
    let err = serialize(&customer, &SerializeContext::detached()).unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
}
