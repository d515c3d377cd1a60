//! SQL rendering for tables and row statements.
//!
//! Everything dialect-specific is decided here, at compile time: column types,
//! identifier quoting, placeholders and the text of default expressions such
//! as [`garasu_core::SqlExpr::UtcNow`].

use garasu_core::{Column, ColumnDefault, Dialect, ReferentialAction, quote_ident};

use crate::registry::SchemaRegistry;
use crate::table::Table;

fn placeholder(dialect: Dialect, idx: usize) -> String {
    match dialect {
        Dialect::Postgres => format!("${idx}"),
        _ => "?".to_string(),
    }
}

fn column_definition(column: &Column, dialect: Dialect) -> String {
    let mut def = format!(
        "{} {}",
        quote_ident(&column.name, dialect),
        column.sql_type.sql_name(dialect)
    );
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(expr) = &column.server_default {
        def.push_str(" DEFAULT ");
        def.push_str(&expr.compile(dialect));
    }
    if column.unique && !column.primary_key {
        def.push_str(" UNIQUE");
    }
    def
}

/// `CREATE TABLE` statement for `table`.
pub fn create_table_sql(table: &Table, dialect: Dialect) -> String {
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| column_definition(c, dialect))
        .collect();

    let pk = table.primary_key_names();
    if !pk.is_empty() {
        let cols: Vec<String> = pk.iter().map(|c| quote_ident(c, dialect)).collect();
        parts.push(format!("PRIMARY KEY ({})", cols.join(", ")));
    }

    for fk in &table.foreign_keys {
        let local: Vec<String> = fk.columns.iter().map(|c| quote_ident(c, dialect)).collect();
        let remote: Vec<String> = fk
            .referred_columns
            .iter()
            .map(|c| quote_ident(c, dialect))
            .collect();
        let mut clause = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_ident(&fk.effective_name(&table.name), dialect),
            local.join(", "),
            quote_ident(&fk.referred_table, dialect),
            remote.join(", ")
        );
        if fk.on_delete != ReferentialAction::NoAction {
            clause.push_str(" ON DELETE ");
            clause.push_str(fk.on_delete.as_sql());
        }
        parts.push(clause);
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote_ident(&table.name, dialect),
        parts.join(",\n  ")
    )
}

/// `DROP TABLE` statement for `name`.
pub fn drop_table_sql(name: &str, dialect: Dialect) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(name, dialect))
}

/// `CREATE TABLE` statements for every table, referenced tables first.
pub fn create_all_sql(registry: &SchemaRegistry, dialect: Dialect) -> Vec<String> {
    let stmts: Vec<String> = registry
        .sorted_tables()
        .into_iter()
        .map(|t| create_table_sql(t, dialect))
        .collect();
    for stmt in &stmts {
        tracing::trace!(dialect = %dialect, sql = %stmt, "Generated DDL statement");
    }
    stmts
}

/// `DROP TABLE` statements for every table, referencing tables first.
pub fn drop_all_sql(registry: &SchemaRegistry, dialect: Dialect) -> Vec<String> {
    registry
        .sorted_tables()
        .into_iter()
        .rev()
        .map(|t| drop_table_sql(&t.name, dialect))
        .collect()
}

/// `INSERT` statement for the given columns.
///
/// Columns of `table` that are not in `provided` but carry an engine-side
/// default expression are rendered inline with that expression.
pub fn insert_sql(table: &Table, provided: &[&str], dialect: Dialect) -> String {
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for (idx, name) in provided.iter().enumerate() {
        cols.push(quote_ident(name, dialect));
        values.push(placeholder(dialect, idx + 1));
    }
    for column in &table.columns {
        if provided.contains(&column.name.as_str()) {
            continue;
        }
        if let Some(ColumnDefault::Expr(expr)) = &column.default {
            cols.push(quote_ident(&column.name, dialect));
            values.push(expr.compile(dialect));
        }
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&table.name, dialect),
        cols.join(", "),
        values.join(", ")
    )
}

/// `UPDATE ... WHERE <pk>` statement for the given columns, including every
/// column with an engine-side `onupdate` expression.
pub fn update_sql(table: &Table, changed: &[&str], dialect: Dialect) -> String {
    let mut sets = Vec::new();
    let mut idx = 0;
    for name in changed {
        idx += 1;
        sets.push(format!("{} = {}", quote_ident(name, dialect), placeholder(dialect, idx)));
    }
    for column in &table.columns {
        if changed.contains(&column.name.as_str()) {
            continue;
        }
        if let Some(ColumnDefault::Expr(expr)) = &column.onupdate {
            sets.push(format!(
                "{} = {}",
                quote_ident(&column.name, dialect),
                expr.compile(dialect)
            ));
        }
    }
    let mut wheres = Vec::new();
    for pk in table.primary_key_names() {
        idx += 1;
        wheres.push(format!("{} = {}", quote_ident(&pk, dialect), placeholder(dialect, idx)));
    }
    format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(&table.name, dialect),
        sets.join(", "),
        wheres.join(" AND ")
    )
}

/// `DELETE ... WHERE <pk>` statement.
pub fn delete_sql(table: &Table, dialect: Dialect) -> String {
    let wheres: Vec<String> = table
        .primary_key_names()
        .iter()
        .enumerate()
        .map(|(i, pk)| format!("{} = {}", quote_ident(pk, dialect), placeholder(dialect, i + 1)))
        .collect();
    format!(
        "DELETE FROM {} WHERE {}",
        quote_ident(&table.name, dialect),
        wheres.join(" AND ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ForeignKeyConstraint;
    use crate::timestamps::TimestampInjector;
    use garasu_core::SqlType;

    fn stamped_registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        TimestampInjector::install(&registry);
        let mut order = Table::new(
            "order",
            vec![
                Column::new("id", SqlType::Char(10)).primary_key(),
                Column::new("customer_id", SqlType::Char(10)),
            ],
        );
        order.foreign_keys.push(ForeignKeyConstraint::new(
            vec!["customer_id".into()],
            "customer",
            vec!["id".into()],
        ));
        registry.attach(order).unwrap();
        registry
            .attach(Table::new(
                "customer",
                vec![
                    Column::new("id", SqlType::Char(10)).primary_key(),
                    Column::new("slug", SqlType::Unicode(200)).unique(true),
                ],
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_create_table_postgres() {
        let registry = stamped_registry();
        let sql = create_table_sql(registry.table("order").unwrap(), Dialect::Postgres);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"order\""));
        assert!(sql.contains("\"id\" CHAR(10) NOT NULL"));
        assert!(sql.contains("\"created\" TIMESTAMP WITHOUT TIME ZONE NOT NULL DEFAULT now()"));
        assert!(sql.contains("PRIMARY KEY (\"id\")"));
        assert!(sql.contains(
            "CONSTRAINT \"fk_order_customer_id\" FOREIGN KEY (\"customer_id\") REFERENCES \"customer\" (\"id\")"
        ));
    }

    #[test]
    fn test_unique_column() {
        let registry = stamped_registry();
        let sql = create_table_sql(registry.table("customer").unwrap(), Dialect::Sqlite);
        assert!(sql.contains("\"slug\" VARCHAR(200) UNIQUE"));
    }

    #[test]
    fn test_create_all_orders_by_dependency() {
        let registry = stamped_registry();
        let stmts = create_all_sql(&registry, Dialect::Sqlite);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("\"customer\""));
        assert!(stmts[1].contains("\"order\""));

        let drops = drop_all_sql(&registry, Dialect::Sqlite);
        assert_eq!(
            drops,
            vec![
                "DROP TABLE IF EXISTS \"order\"".to_string(),
                "DROP TABLE IF EXISTS \"customer\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_insert_compiles_utcnow_per_dialect() {
        let registry = stamped_registry();
        let table = registry.table("customer").unwrap();

        let pg = insert_sql(table, &["id", "slug"], Dialect::Postgres);
        assert_eq!(
            pg,
            "INSERT INTO \"customer\" (\"id\", \"slug\", \"created\", \"modified\") VALUES ($1, $2, \
             TIMEZONE('utc', CURRENT_TIMESTAMP), TIMEZONE('utc', CURRENT_TIMESTAMP))"
        );

        let lite = insert_sql(table, &["id", "slug"], Dialect::Sqlite);
        assert!(lite.contains("VALUES (?, ?, (CURRENT_TIMESTAMP), (CURRENT_TIMESTAMP))"));

        let generic = insert_sql(table, &["id", "slug"], Dialect::Generic);
        assert!(generic.contains("utcnow(), utcnow()"));
    }

    #[test]
    fn test_update_touches_modified_only() {
        let registry = stamped_registry();
        let table = registry.table("customer").unwrap();
        let sql = update_sql(table, &["slug"], Dialect::Postgres);
        assert_eq!(
            sql,
            "UPDATE \"customer\" SET \"slug\" = $1, \"modified\" = TIMEZONE('utc', CURRENT_TIMESTAMP) WHERE \"id\" = $2"
        );
    }

    #[test]
    fn test_delete_sql() {
        let registry = stamped_registry();
        let sql = delete_sql(registry.table("order").unwrap(), Dialect::Mysql);
        assert_eq!(sql, "DELETE FROM `order` WHERE `id` = ?");
    }
}
