use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::net::TcpListener;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};

use innkeep::model::PaymentPolicy;
use innkeep::tenant::TenantManager;
use innkeep::wire;

const PASSWORD: &str = "innkeep";
const DAY: i64 = 86_400;
const START: i64 = 1_767_225_600;

static NEXT_DB: AtomicU32 = AtomicU32::new(0);

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server(policy: PaymentPolicy) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let tm = Arc::new(TenantManager::new(policy));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, PASSWORD.to_string(), None).await;
            });
        }
    });

    addr
}

fn fresh_db() -> String {
    format!("market_{}", NEXT_DB.fetch_add(1, Ordering::Relaxed))
}

/// Connect as `user`; the login name is the caller identity.
async fn connect(addr: SocketAddr, db: &str, user: &str) -> Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(db)
        .user(user)
        .password(PASSWORD);

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn sqlstate(client: &Client, sql: &str) -> String {
    let err = client.simple_query(sql).await.err().expect("statement should fail");
    err.as_db_error()
        .expect("server error")
        .code()
        .code()
        .to_string()
}

async fn create_accommodation(client: &Client, metadata: &str, price: u64) -> String {
    let out = rows(
        client,
        &format!("INSERT INTO accommodations (metadata, price_per_night) VALUES ('{metadata}', {price})"),
    )
    .await;
    assert_eq!(out.len(), 1);
    out[0].get("id").unwrap().to_string()
}

fn booking_sql(accommodation_id: &str, start: i64, end: i64, payment: u64) -> String {
    format!(
        r#"INSERT INTO bookings (accommodation_id, start, "end", payment) VALUES ({accommodation_id}, {start}, {end}, {payment})"#
    )
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_list_accommodations() {
    let addr = start_test_server(PaymentPolicy::Permissive).await;
    let db = fresh_db();
    let alice = connect(addr, &db, "alice").await;

    let id = create_accommodation(&alice, "ipfs://villa", 100).await;
    assert_eq!(id, "1");

    let listed = rows(&alice, "SELECT * FROM accommodations").await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].get("owner"), Some("alice"));
    assert_eq!(listed[0].get("metadata"), Some("ipfs://villa"));
    assert_eq!(listed[0].get("price_per_night"), Some("100"));
    assert_eq!(listed[0].get("listed"), Some("f"));

    let mine = rows(&alice, "SELECT * FROM my_accommodations").await;
    assert_eq!(mine.len(), 1);
}

#[tokio::test]
async fn owner_only_updates() {
    let addr = start_test_server(PaymentPolicy::Permissive).await;
    let db = fresh_db();
    let alice = connect(addr, &db, "alice").await;
    let bob = connect(addr, &db, "bob").await;

    let id = create_accommodation(&alice, "uri", 100).await;

    alice
        .simple_query(&format!("INSERT INTO prices (accommodation_id, price_per_night) VALUES ({id}, 250)"))
        .await
        .unwrap();
    alice
        .simple_query(&format!("INSERT INTO listings (accommodation_id, listed) VALUES ({id}, true)"))
        .await
        .unwrap();

    let code = sqlstate(
        &bob,
        &format!("INSERT INTO prices (accommodation_id, price_per_night) VALUES ({id}, 1)"),
    )
    .await;
    assert_eq!(code, "42501");

    let code = sqlstate(
        &bob,
        "INSERT INTO prices (accommodation_id, price_per_night) VALUES (99, 1)",
    )
    .await;
    assert_eq!(code, "P0002");

    let row = rows(&bob, &format!("SELECT * FROM accommodations WHERE id = {id}")).await;
    assert_eq!(row[0].get("price_per_night"), Some("250"));
    assert_eq!(row[0].get("listed"), Some("t"));
}

#[tokio::test]
async fn booking_lifecycle_over_wire() {
    let addr = start_test_server(PaymentPolicy::Permissive).await;
    let db = fresh_db();
    let alice = connect(addr, &db, "alice").await;
    let bob = connect(addr, &db, "bob").await;
    let carol = connect(addr, &db, "carol").await;

    let acc = create_accommodation(&alice, "uri", 100).await;

    let booked = rows(&bob, &booking_sql(&acc, START, START + 2 * DAY, 200)).await;
    assert_eq!(booked.len(), 1);
    let booking_id = booked[0].get("id").unwrap().to_string();
    assert_eq!(booked[0].get("renter"), Some("bob"));
    assert_eq!(booked[0].get("checked_in"), Some("f"));

    // Overlapping request from another renter
    let code = sqlstate(&carol, &booking_sql(&acc, START + DAY, START + 3 * DAY, 200)).await;
    assert_eq!(code, "23P01");

    // Back-to-back is fine
    rows(&carol, &booking_sql(&acc, START + 2 * DAY, START + 3 * DAY, 100)).await;

    // Owner cannot book their own place
    let code = sqlstate(&alice, &booking_sql(&acc, START + 10 * DAY, START + 11 * DAY, 100)).await;
    assert_eq!(code, "42501");

    // Empty range
    let code = sqlstate(&carol, &booking_sql(&acc, START + 20 * DAY, START + 20 * DAY, 0)).await;
    assert_eq!(code, "22023");

    // Only the renter may check in
    let code = sqlstate(
        &carol,
        &format!("INSERT INTO check_ins (booking_id) VALUES ({booking_id})"),
    )
    .await;
    assert_eq!(code, "42501");
    bob.simple_query(&format!("INSERT INTO check_ins (booking_id) VALUES ({booking_id})"))
        .await
        .unwrap();

    let mine = rows(&bob, "SELECT * FROM my_bookings").await;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].get("checked_in"), Some("t"));

    let blocked = rows(&alice, &format!("SELECT * FROM unavailable WHERE accommodation_id = {acc}")).await;
    assert_eq!(blocked.len(), 2);
    assert_eq!(blocked[0].get("start"), Some(START.to_string().as_str()));
    assert_eq!(blocked[1].get("end"), Some((START + 3 * DAY).to_string().as_str()));
}

#[tokio::test]
async fn no_bookings_is_an_error() {
    let addr = start_test_server(PaymentPolicy::Permissive).await;
    let db = fresh_db();
    let dave = connect(addr, &db, "dave").await;

    assert_eq!(sqlstate(&dave, "SELECT * FROM my_bookings").await, "P0002");
}

#[tokio::test]
async fn exact_payment_policy_over_wire() {
    let addr = start_test_server(PaymentPolicy::ExactNightly).await;
    let db = fresh_db();
    let alice = connect(addr, &db, "alice").await;
    let bob = connect(addr, &db, "bob").await;

    let acc = create_accommodation(&alice, "uri", 100).await;
    let code = sqlstate(&bob, &booking_sql(&acc, START, START + 2 * DAY, 150)).await;
    assert_eq!(code, "22023");
    rows(&bob, &booking_sql(&acc, START, START + 2 * DAY, 200)).await;
}

#[tokio::test]
async fn events_journal_over_wire() {
    let addr = start_test_server(PaymentPolicy::Permissive).await;
    let db = fresh_db();
    let alice = connect(addr, &db, "alice").await;
    let bob = connect(addr, &db, "bob").await;

    let acc = create_accommodation(&alice, "uri", 100).await;
    rows(&bob, &booking_sql(&acc, START, START + DAY, 100)).await;
    // Rejected request leaves no trace
    let _ = bob.simple_query(&booking_sql(&acc, START, START + DAY, 100)).await;

    let events = rows(&alice, "SELECT * FROM events").await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].get("seq"), Some("1"));
    assert_eq!(events[0].get("type"), Some("accommodation_created"));
    assert_eq!(events[1].get("type"), Some("booking_created"));

    let payload: serde_json::Value =
        serde_json::from_str(events[1].get("payload").unwrap()).unwrap();
    assert_eq!(payload["renter"], "bob");
    assert_eq!(payload["start"], START);

    let tail = rows(&alice, "SELECT * FROM events WHERE seq > 1").await;
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].get("seq"), Some("2"));
}

#[tokio::test]
async fn tenants_are_isolated_by_database() {
    let addr = start_test_server(PaymentPolicy::Permissive).await;
    let alice_a = connect(addr, &fresh_db(), "alice").await;
    let alice_b = connect(addr, &fresh_db(), "alice").await;

    create_accommodation(&alice_a, "uri", 100).await;
    assert!(rows(&alice_b, "SELECT * FROM accommodations").await.is_empty());
}

#[tokio::test]
async fn malformed_sql_is_a_syntax_error() {
    let addr = start_test_server(PaymentPolicy::Permissive).await;
    let client = connect(addr, &fresh_db(), "alice").await;

    assert_eq!(sqlstate(&client, "SELECT * FROM nowhere").await, "42601");
    assert_eq!(sqlstate(&client, "DELETE FROM bookings").await, "42601");
}

#[tokio::test]
async fn extended_protocol_with_parameters() {
    let addr = start_test_server(PaymentPolicy::Permissive).await;
    let db = fresh_db();
    let alice = connect(addr, &db, "alice").await;
    let bob = connect(addr, &db, "bob").await;

    let acc = create_accommodation(&alice, "uri", 100).await;

    let stmt = bob
        .prepare(r#"INSERT INTO bookings (accommodation_id, start, "end", payment) VALUES ($1, $2, $3, $4)"#)
        .await
        .unwrap();
    let start = START.to_string();
    let end = (START + DAY).to_string();
    let out = bob
        .query(&stmt, &[&acc, &start, &end, &"100"])
        .await
        .unwrap();
    assert_eq!(out.len(), 1);
    let renter: &str = out[0].get("renter");
    assert_eq!(renter, "bob");
}

#[tokio::test]
async fn disconnect_does_not_lose_state() {
    let addr = start_test_server(PaymentPolicy::Permissive).await;
    let db = fresh_db();
    {
        let alice = connect(addr, &db, "alice").await;
        create_accommodation(&alice, "uri", 100).await;
    }
    let alice = connect(addr, &db, "alice").await;
    assert_eq!(rows(&alice, "SELECT * FROM my_accommodations").await.len(), 1);
}

#[tokio::test]
async fn extended_protocol_keeps_dollar_text_in_metadata() {
    let addr = start_test_server(PaymentPolicy::Permissive).await;
    let alice = connect(addr, &fresh_db(), "alice").await;

    let stmt = alice
        .prepare("INSERT INTO accommodations (price_per_night, metadata) VALUES ($1, $2)")
        .await
        .unwrap();
    let out = alice.query(&stmt, &[&"100", &"costs $1 a night"]).await.unwrap();
    assert_eq!(out.len(), 1);
    let metadata: &str = out[0].get("metadata");
    assert_eq!(metadata, "costs $1 a night");
}

#[tokio::test]
async fn pre_epoch_booking_over_wire() {
    let addr = start_test_server(PaymentPolicy::Permissive).await;
    let db = fresh_db();
    let alice = connect(addr, &db, "alice").await;
    let bob = connect(addr, &db, "bob").await;

    let acc = create_accommodation(&alice, "uri", 100).await;
    rows(&bob, &booking_sql(&acc, 0, DAY, 100)).await;
    rows(&bob, &booking_sql(&acc, -DAY, 0, 100)).await;

    let blocked = rows(&bob, &format!("SELECT * FROM unavailable WHERE accommodation_id = {acc}")).await;
    assert_eq!(blocked.len(), 2);
    assert_eq!(blocked[1].get("start"), Some("-86400"));
}
