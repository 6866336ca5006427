//! Order/line/note/address forms over an in-memory SQLite database.

#![allow(dead_code)]

use std::sync::Arc;

use formdb::prelude::*;
use rusqlite::Connection;

const DDL: &str = "
CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    tenant INTEGER NOT NULL,
    customer TEXT NOT NULL,
    modified_at TEXT NOT NULL
);
CREATE TABLE order_lines (
    order_id INTEGER NOT NULL REFERENCES orders(id),
    line_no INTEGER NOT NULL,
    qty INTEGER NOT NULL,
    PRIMARY KEY (order_id, line_no)
);
CREATE TABLE line_notes (
    order_id INTEGER NOT NULL,
    line_no INTEGER NOT NULL,
    note_no INTEGER NOT NULL,
    text TEXT NOT NULL,
    PRIMARY KEY (order_id, line_no, note_no),
    FOREIGN KEY (order_id, line_no) REFERENCES order_lines(order_id, line_no)
);
CREATE TABLE addresses (
    order_id INTEGER PRIMARY KEY REFERENCES orders(id),
    city TEXT NOT NULL
);
CREATE TABLE tags (
    id INTEGER PRIMARY KEY,
    tenant INTEGER NOT NULL,
    label TEXT NOT NULL
);
";

pub const TENANT: i64 = 7;

pub fn open() -> Connection {
    let conn = Connection::open_in_memory().expect("open sqlite memory db");
    formdb_sqlite::configure(&conn).expect("configure connection");
    conn.execute_batch(DDL).expect("create tables");
    conn
}

pub fn caller() -> Caller {
    Caller::user("ann").with_tenant(TENANT)
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .expect("count rows")
}

fn linked(name: &str, column: &str) -> Field {
    Field::new(name, ValueType::Integer).persisted_as(column, ColumnRole::PrimaryKey)
}

/// `order` with tabular `lines` (1..=3, each with tabular `notes`) and an
/// optional singular `address`.
pub fn order_form() -> Arc<Form> {
    let config = formdb_sqlite::config();

    let note = Schema::builder("note")
        .table("line_notes")
        .field(linked("orderId", "order_id"))
        .field(linked("lineNo", "line_no"))
        .field(linked("noteNo", "note_no"))
        .field(Field::column("text", ValueType::Text, ColumnRole::RequiredData))
        .build()
        .expect("note schema");
    let line = Schema::builder("line")
        .table("order_lines")
        .field(linked("orderId", "order_id"))
        .field(linked("lineNo", "line_no"))
        .field(Field::column("qty", ValueType::Integer, ColumnRole::RequiredData))
        .build()
        .expect("line schema");
    let address = Schema::builder("address")
        .table("addresses")
        .field(linked("orderId", "order_id"))
        .field(Field::column("city", ValueType::Text, ColumnRole::RequiredData))
        .build()
        .expect("address schema");
    let order = Schema::builder("order")
        .table("orders")
        .field(Field::column("id", ValueType::Integer, ColumnRole::GeneratedPrimaryKey))
        .field(Field::column("tenant", ValueType::Integer, ColumnRole::TenantKey))
        .field(Field::column("customer", ValueType::Text, ColumnRole::RequiredData))
        .field(
            Field::new("modifiedAt", ValueType::Timestamp)
                .persisted_as("modified_at", ColumnRole::ModifiedAt),
        )
        .concurrency_check(true)
        .build()
        .expect("order schema");

    let notes = Form::builder(&note).config(config.clone()).build().expect("note form");
    let lines = Form::builder(&line)
        .config(config.clone())
        .link(
            LinkDescriptor::tabular("notes")
                .on("orderId", "orderId")
                .on("lineNo", "lineNo"),
            &notes,
        )
        .build()
        .expect("line form");
    let address = Form::builder(&address)
        .config(config.clone())
        .build()
        .expect("address form");
    Form::builder(&order)
        .config(config)
        .link(LinkDescriptor::tabular("lines").on("id", "orderId").rows(1, 3), &lines)
        .link(LinkDescriptor::singular("address").on("id", "orderId"), &address)
        .build()
        .expect("order form")
}

/// A flat form with a generated key and no links.
pub fn tag_form() -> Arc<Form> {
    let tag = Schema::builder("tag")
        .table("tags")
        .field(Field::column("id", ValueType::Integer, ColumnRole::GeneratedPrimaryKey))
        .field(Field::column("tenant", ValueType::Integer, ColumnRole::TenantKey))
        .field(Field::column("label", ValueType::Text, ColumnRole::RequiredData))
        .build()
        .expect("tag schema");
    Form::builder(&tag)
        .config(formdb_sqlite::config())
        .build()
        .expect("tag form")
}
