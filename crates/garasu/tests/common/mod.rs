//! Shop fixtures shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDateTime;
use garasu::prelude::*;
use garasu::{CREATED_COLUMN, MODIFIED_COLUMN, MemoryEngine};

#[derive(Debug)]
pub struct Customer {
    pub id: Option<String>,
    pub name: String,
    pub slug: Slug,
    pub followers: Followers,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub orders: RelatedMany<Order>,
}

impl Customer {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            slug: Slug::from_source(name),
            followers: Followers::default(),
            created: None,
            modified: None,
            orders: RelatedMany::loaded("customer_id", Value::Null, Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }
}

impl Entity for Customer {
    const ENTITY_NAME: &'static str = "Customer";
    const TABLE_NAME: &'static str = "customer";

    fn columns() -> Vec<Column> {
        let mut cols = SurrogatePk::columns();
        cols.push(Column::new("name", SqlType::Unicode(100)).nullable(false));
        cols.extend(Slug::columns());
        cols.extend(Followers::columns());
        cols
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new()
            .with("id", self.id.clone())
            .with("name", &self.name);
        self.slug.write_to(&mut row);
        self.followers.write_to(&mut row);
        row
    }

    fn from_row(row: &Row) -> Result<Self> {
        let id: Option<String> = row.get_named("id")?;
        Ok(Self {
            orders: RelatedMany::new("customer_id", id.clone()),
            id,
            name: row.get_named("name")?,
            slug: Slug::read_from(row)?,
            followers: Followers::read_from(row)?,
            created: row.get_named(CREATED_COLUMN)?,
            modified: row.get_named(MODIFIED_COLUMN)?,
        })
    }
}

impl Serializable for Customer {
    fn entity_name(&self) -> &'static str {
        "Customer"
    }

    fn attributes(&self) -> Vec<(&'static str, Attr<'_>)> {
        let mut attrs = vec![
            ("id", Attr::opt_text(self.id.as_deref())),
            ("name", Attr::text(&self.name)),
            ("slug", Attr::opt_text(self.slug.get())),
            ("created", self.created.map_or(Attr::Null, Attr::DateTime)),
            ("modified", self.modified.map_or(Attr::Null, Attr::DateTime)),
        ];
        attrs.extend(self.followers.attributes());
        if let Some(orders) = self.orders.attr() {
            attrs.push(("orders", orders));
        }
        attrs
    }

    fn eager_load(&self) -> &'static [&'static str] {
        &["orders"]
    }

    fn serialization_blacklist(&self) -> &'static [&'static str] {
        &["rank", "modified"]
    }

    fn load(&self, field: &str, ctx: &SerializeContext<'_>) -> Result<()> {
        if field == "orders" {
            self.orders.load_in(ctx)?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("<Customer {}>", self.slug.get().unwrap_or_default())
    }
}

#[derive(Debug)]
pub struct Order {
    pub id: Option<String>,
    pub customer_id: Option<String>,
    pub amount: i64,
    pub customer: Related<Customer>,
}

impl Order {
    pub fn for_customer(customer: &Customer, amount: i64) -> Self {
        Self {
            id: None,
            customer_id: customer.id.clone(),
            amount,
            customer: Related::new(vec![customer.id.clone().into()]),
        }
    }
}

impl Entity for Order {
    const ENTITY_NAME: &'static str = "Order";
    const TABLE_NAME: &'static str = "order";

    fn columns() -> Vec<Column> {
        let mut cols = SurrogatePk::columns();
        cols.push(Column::new("amount", SqlType::BigInt).nullable(false));
        cols
    }

    fn references() -> &'static [&'static str] {
        &["Customer"]
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id.clone())
            .with("customer_id", self.customer_id.clone())
            .with("amount", self.amount)
    }

    fn from_row(row: &Row) -> Result<Self> {
        let customer_id: Option<String> = row.get_named("customer_id")?;
        Ok(Self {
            customer: Related::new(vec![customer_id.clone().into()]),
            id: row.get_named("id")?,
            customer_id,
            amount: row.get_named("amount")?,
        })
    }
}

impl Serializable for Order {
    fn entity_name(&self) -> &'static str {
        "Order"
    }

    fn attributes(&self) -> Vec<(&'static str, Attr<'_>)> {
        let mut attrs = vec![
            ("id", Attr::opt_text(self.id.as_deref())),
            ("amount", Attr::Int(self.amount)),
        ];
        if let Some(customer) = self.customer.attr() {
            attrs.push(("customer", customer));
        }
        attrs
    }
}

pub fn settings() -> Settings {
    Settings::new().should_create_all(true)
}

/// Both entities registered, order first.
pub fn configurator(settings: Settings) -> Configurator {
    let mut config = Configurator::new(settings);
    config
        .add_entity::<Order>()
        .and_then(|c| c.add_entity::<Customer>())
        .unwrap();
    config
}

/// A committed shop bound to a fresh memory engine the test can inspect.
pub fn shop() -> (Arc<MemoryEngine>, App) {
    let engine = Arc::new(MemoryEngine::default());
    let app = configurator(settings())
        .commit_with_engine(engine.clone())
        .unwrap();
    (engine, app)
}

/// Persist `name` and return the stored customer.
pub fn persist_customer(app: &App, name: &str) -> Customer {
    app.run(|uow| uow.db().add(Customer::new(name))).unwrap()
}
