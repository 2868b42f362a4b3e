///  To run :
///  cargo r --example client_example
use std::sync::Arc;

use reqwest::StatusCode;
use storefront_client::{ReviewRequest, StoreClient};
use storefront_hex::auth::JwtAuth;
use storefront_hex::inbound::http::{AppState, HttpServer, HttpServerConfig};
use storefront_hex::outbound::LogNotifier;
use storefront_repo::build_repo;
use storefront_types::domain::caller::{Role, UserProfile};
use storefront_types::domain::order::{LineRequest, OrderStatus, PaymentMethod};
use storefront_types::domain::product::Product;
use storefront_types::ports::catalog_repository::CatalogRepository;
use storefront_types::ports::user_directory::UserDirectory;
use tempfile::tempdir;
use uuid::Uuid;

const SECRET: &str = "client-example-secret-0123456789abcdef";

fn find_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port = find_free_port();
    let addr = format!("http://127.0.0.1:{port}/");

    // Use a temp file-backed SQLite DB so multiple connections see the same data.
    let tmp = tempdir()?;
    let db_path = tmp.path().join("storefront.db");
    let db_url = format!("sqlite://{}", db_path.display());

    let repo = build_repo(Some(&db_url)).await?;
    let shopper = UserProfile {
        id: Uuid::new_v4(),
        name: "Example".into(),
        email: "example@example.com".into(),
        address: "10 Demo Road".into(),
        role: Role::Customer,
    };
    repo.upsert_user(shopper.clone()).await?;
    let kettle = repo
        .create_product(Product::new(
            "Kettle".into(),
            "1.7l".into(),
            2999,
            4,
            None,
            None,
        )?)
        .await?;

    let auth = JwtAuth::new(SECRET, 60);
    let token = auth.issue(shopper.id)?;
    let state = AppState::new(Arc::new(repo), Arc::new(LogNotifier), auth);
    let server = HttpServer::new(
        state,
        HttpServerConfig {
            port: port.to_string(),
        },
    )
    .await?;

    let handle = tokio::spawn(async move {
        server.run().await.expect("server run");
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let client = StoreClient::builder(&addr)?.with_token(&token)?.build()?;

    let created = client
        .create_order(vec![LineRequest::new(kettle.id, 2)])
        .await?;
    println!("Created order id={} total={}", created.id, created.total_cents);
    assert_eq!(created.status, OrderStatus::Pending);

    let resized = client.update_quantity(created.id, kettle.id, 1).await?;
    println!("Resized order total={}", resized.total_cents);

    // Asking for more than is on the shelf is refused.
    let err = client
        .update_quantity(created.id, kettle.id, 10)
        .await
        .unwrap_err();
    let status = err.downcast_ref::<reqwest::Error>().and_then(|e| e.status());
    println!("Oversized update answered {:?}", status);
    assert_eq!(status, Some(StatusCode::CONFLICT));

    let shipped = client
        .checkout(created.id, PaymentMethod::CashOnDelivery)
        .await?;
    println!("Checked out, status={:?}", shipped.status);

    let review = client
        .submit_review(ReviewRequest {
            product_id: kettle.id,
            order_id: created.id,
            rating: 5,
            comment: "boils fast".into(),
        })
        .await?;
    println!("Reviewed with rating {}", review.rating.value());

    let product = client.product(kettle.id).await?;
    println!(
        "Kettle now has stock {} and average rating {}",
        product.product.stocks, product.average_rating
    );

    let mine = client.my_orders().await?;
    println!("My orders: {:?}", mine.iter().map(|o| o.status).collect::<Vec<_>>());

    handle.abort();
    Ok(())
}
