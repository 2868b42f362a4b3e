use std::collections::HashMap;
use std::sync::Arc;

use storefront_types::domain::caller::{Caller, UserSummary};
use storefront_types::domain::order::{LineRequest, Order, OrderLine, OrderStatus, PaymentMethod};
use storefront_types::domain::sales::{monthly_sales, MonthlySales};
use storefront_types::domain::views::{OrderView, ProductSummary};
use storefront_types::ports::notifier::{NotificationKind, Notifier, OrderStatusChanged};
use storefront_types::ports::StoreRepository;
use uuid::Uuid;

use super::locks::{KeyGuard, KeyedLocks};
use crate::errors::AppError;

/// Order lifecycle: placement, quantity edits, status changes, checkout and
/// removal. Stock moves only through the catalog's atomic operations and every
/// read-modify-write of an order runs under that order's lock.
pub struct OrderService<R: StoreRepository> {
    repo: Arc<R>,
    notifier: Arc<dyn Notifier>,
    order_locks: KeyedLocks<Uuid>,
}

fn forbidden(order_id: Uuid) -> AppError {
    AppError::Forbidden(format!("not allowed to modify order {order_id}"))
}

impl<R: StoreRepository> OrderService<R> {
    pub fn new(repo: Arc<R>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            repo,
            notifier,
            order_locks: KeyedLocks::new(),
        }
    }

    pub fn repo(&self) -> &Arc<R> {
        &self.repo
    }

    pub async fn create_order(
        &self,
        caller: &Caller,
        lines: Vec<LineRequest>,
    ) -> Result<Order, AppError> {
        LineRequest::validate_all(&lines).map_err(|e| AppError::BadRequest(e.to_string()))?;

        let snapshots = self.repo.reserve_stock(&lines).await?;
        let items = lines
            .iter()
            .zip(&snapshots)
            .map(|(line, product)| OrderLine {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price_cents: product.price_cents,
            })
            .collect();

        let order = match Order::new(caller.id, caller.address.clone(), items) {
            Ok(order) => order,
            Err(e) => {
                self.release_quietly(&lines).await;
                return Err(AppError::BadRequest(e.to_string()));
            }
        };
        if let Err(e) = self.repo.create_order(order.clone()).await {
            self.release_quietly(&lines).await;
            return Err(e.into());
        }

        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            total_cents = order.total_cents,
            lines = order.items.len(),
            "order created"
        );
        Ok(order)
    }

    pub async fn update_order_quantity(
        &self,
        caller: &Caller,
        order_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<Order, AppError> {
        if quantity == 0 {
            return Err(AppError::BadRequest("quantity must be > 0".into()));
        }
        let _guard = self.order_locks.lock(order_id).await;
        let mut order = self.load_order(order_id).await?;
        if !caller.may_act_on(order.user_id) {
            return Err(forbidden(order_id));
        }
        if !order.status.allows_quantity_change() {
            return Err(AppError::Conflict(format!(
                "order {order_id} is {}; quantities can only change while pending",
                order.status
            )));
        }
        let old = order
            .line(product_id)
            .map(|line| line.quantity)
            .ok_or_else(|| AppError::NotFound(format!("product {product_id} in order {order_id}")))?;

        order
            .set_quantity(product_id, quantity)
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        // Positive delta takes more stock, negative gives it back.
        let delta = quantity as i64 - old as i64;
        if delta > 0 {
            self.repo.adjust_stock(product_id, -delta).await?;
        } else if delta < 0 {
            self.repo
                .release_stock(&[LineRequest::new(product_id, (-delta) as u32)])
                .await?;
        }

        match self.repo.update_order(order).await {
            Ok(Some(updated)) => {
                tracing::info!(%order_id, %product_id, old, new = quantity, "order quantity updated");
                Ok(updated)
            }
            outcome => {
                self.revert_stock_delta(product_id, delta).await;
                match outcome {
                    Err(e) => Err(e.into()),
                    _ => Err(AppError::NotFound(format!("order {order_id}"))),
                }
            }
        }
    }

    pub async fn update_order_status(
        &self,
        caller: &Caller,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<Order, AppError> {
        let updated = {
            let _guard = self.order_locks.lock(order_id).await;
            let mut order = self.load_order(order_id).await?;
            if !caller.may_act_on(order.user_id) {
                return Err(forbidden(order_id));
            }
            let previous = order.status;
            order.update_status(status);
            let updated = self.store(order).await?;
            tracing::info!(%order_id, from = %previous, to = %status, "order status updated");
            updated
        };
        self.notify(NotificationKind::StatusUpdated, &updated).await;
        Ok(updated)
    }

    pub async fn checkout_order(
        &self,
        caller: &Caller,
        order_id: Uuid,
        payment_method: PaymentMethod,
    ) -> Result<Order, AppError> {
        let updated = {
            let _guard = self.order_locks.lock(order_id).await;
            let mut order = self.load_order(order_id).await?;
            if !caller.may_act_on(order.user_id) {
                return Err(forbidden(order_id));
            }
            order.checkout(payment_method, caller.address.clone());
            let updated = self.store(order).await?;
            tracing::info!(
                %order_id,
                payment_method = payment_method.as_str(),
                total_cents = updated.total_cents,
                "order checked out"
            );
            updated
        };
        self.notify(NotificationKind::CheckoutConfirmed, &updated).await;
        Ok(updated)
    }

    pub async fn delete_order(&self, caller: &Caller, order_id: Uuid) -> Result<(), AppError> {
        let _guard = self.order_locks.lock(order_id).await;
        let order = self.load_order(order_id).await?;
        if !caller.may_act_on(order.user_id) {
            return Err(forbidden(order_id));
        }
        if !order.status.allows_delete() {
            return Err(AppError::Conflict(format!(
                "order {order_id} is {}; only pending or cancelled orders can be deleted",
                order.status
            )));
        }
        let lines = order.stock_lines();
        self.repo.release_stock(&lines).await?;
        let outcome = match self.repo.delete_order(order_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AppError::NotFound(format!("order {order_id}"))),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = outcome {
            // The order survives, so its units go back on hold.
            if let Err(undo) = self.repo.reserve_stock(&lines).await {
                tracing::error!(%order_id, error = %undo, "failed to re-reserve stock after failed delete");
            }
            return Err(e);
        }
        tracing::info!(%order_id, lines = order.items.len(), "order deleted and restocked");
        Ok(())
    }

    pub async fn list_all_orders(&self, caller: &Caller) -> Result<Vec<OrderView>, AppError> {
        if !caller.is_admin() {
            return Err(AppError::Forbidden("admin only".into()));
        }
        let orders = self.repo.list_orders().await?;
        self.project(orders).await
    }

    pub async fn list_user_orders(&self, caller: &Caller) -> Result<Vec<OrderView>, AppError> {
        let orders = self.repo.list_orders_for_user(caller.id).await?;
        self.project(orders).await
    }

    pub async fn sales_by_month(&self, caller: &Caller) -> Result<Vec<MonthlySales>, AppError> {
        if !caller.is_admin() {
            return Err(AppError::Forbidden("admin only".into()));
        }
        let orders = self.repo.list_orders().await?;
        Ok(monthly_sales(&orders))
    }

    /// Serializes against every other mutation of `order_id`.
    pub(crate) async fn lock_order(&self, order_id: Uuid) -> KeyGuard<'_, Uuid> {
        self.order_locks.lock(order_id).await
    }

    /// Marks an order `success` after one of its products was reviewed.
    /// The caller must hold the order's lock from [`Self::lock_order`].
    pub(crate) async fn mark_reviewed(&self, mut order: Order) -> Result<Order, AppError> {
        let order_id = order.id;
        if order.status != OrderStatus::Success {
            order.update_status(OrderStatus::Success);
            order = self.store(order).await?;
            tracing::debug!(%order_id, "order marked success after review");
        }
        Ok(order)
    }

    pub(crate) async fn load_order(&self, order_id: Uuid) -> Result<Order, AppError> {
        self.repo
            .get_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))
    }

    async fn store(&self, order: Order) -> Result<Order, AppError> {
        let id = order.id;
        self.repo
            .update_order(order)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {id}")))
    }

    async fn release_quietly(&self, lines: &[LineRequest]) {
        if let Err(e) = self.repo.release_stock(lines).await {
            tracing::error!(error = %e, "failed to release reserved stock");
        }
    }

    async fn revert_stock_delta(&self, product_id: Uuid, delta: i64) {
        if let Err(e) = self.repo.adjust_stock(product_id, delta).await {
            tracing::error!(%product_id, delta, error = %e, "failed to revert stock change");
        }
    }

    async fn project(&self, orders: Vec<Order>) -> Result<Vec<OrderView>, AppError> {
        let products: HashMap<Uuid, ProductSummary> = self
            .repo
            .list_products()
            .await?
            .iter()
            .map(|p| (p.id, ProductSummary::from(p)))
            .collect();

        let mut users: HashMap<Uuid, Option<UserSummary>> = HashMap::new();
        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            let user = match users.get(&order.user_id) {
                Some(cached) => cached.clone(),
                None => {
                    let found = self
                        .repo
                        .get_user(order.user_id)
                        .await?
                        .as_ref()
                        .map(UserSummary::from);
                    users.insert(order.user_id, found.clone());
                    found
                }
            };
            views.push(OrderView::new(order, user, |id| products.get(&id).cloned()));
        }
        Ok(views)
    }

    async fn notify(&self, kind: NotificationKind, order: &Order) {
        let recipient = match self.repo.get_user(order.user_id).await {
            Ok(profile) => profile.as_ref().map(UserSummary::from),
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "recipient lookup failed");
                None
            }
        };
        let event = OrderStatusChanged::new(kind, order, recipient);
        if let Err(e) = self.notifier.order_status_changed(&event).await {
            tracing::warn!(order_id = %order.id, error = %e, "order notification failed");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use storefront_repo::memory::InMemoryRepo;
    use storefront_types::domain::brand::Brand;
    use storefront_types::domain::caller::{Role, UserProfile};
    use storefront_types::domain::product::Product;
    use storefront_types::domain::review::{Review, ReviewKey};
    use storefront_types::ports::catalog_repository::CatalogRepository;
    use storefront_types::ports::notifier::NotifyError;
    use storefront_types::ports::order_repository::OrderRepository;
    use storefront_types::ports::review_repository::ReviewRepository;
    use storefront_types::ports::user_directory::UserDirectory;
    use storefront_types::ports::RepoError;

    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub events: Mutex<Vec<OrderStatusChanged>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn order_status_changed(&self, event: &OrderStatusChanged) -> Result<(), NotifyError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn order_status_changed(&self, _: &OrderStatusChanged) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("smtp down".into()))
        }
    }

    /// Memory repository whose order writes and restocks can be made to fail.
    #[derive(Clone, Default)]
    pub(crate) struct FlakyRepo {
        pub inner: InMemoryRepo,
        pub fail_order_delete: Arc<AtomicBool>,
        pub fail_order_update: Arc<AtomicBool>,
        pub fail_release: Arc<AtomicBool>,
    }

    fn injected(flag: &AtomicBool) -> Result<(), RepoError> {
        if flag.load(Ordering::SeqCst) {
            return Err(RepoError::DbError("injected failure".into()));
        }
        Ok(())
    }

    #[async_trait]
    impl CatalogRepository for FlakyRepo {
        async fn create_brand(&self, brand: Brand) -> Result<Brand, RepoError> {
            self.inner.create_brand(brand).await
        }
        async fn get_brand(&self, id: Uuid) -> Result<Option<Brand>, RepoError> {
            self.inner.get_brand(id).await
        }
        async fn list_brands(&self) -> Result<Vec<Brand>, RepoError> {
            self.inner.list_brands().await
        }
        async fn create_product(&self, product: Product) -> Result<Product, RepoError> {
            self.inner.create_product(product).await
        }
        async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError> {
            self.inner.get_product(id).await
        }
        async fn list_products(&self) -> Result<Vec<Product>, RepoError> {
            self.inner.list_products().await
        }
        async fn adjust_stock(&self, id: Uuid, delta: i64) -> Result<Product, RepoError> {
            self.inner.adjust_stock(id, delta).await
        }
        async fn reserve_stock(&self, lines: &[LineRequest]) -> Result<Vec<Product>, RepoError> {
            self.inner.reserve_stock(lines).await
        }
        async fn release_stock(&self, lines: &[LineRequest]) -> Result<(), RepoError> {
            injected(&self.fail_release)?;
            self.inner.release_stock(lines).await
        }
        async fn adjust_rating(
            &self,
            id: Uuid,
            rating_delta: i64,
            count_delta: i64,
        ) -> Result<Product, RepoError> {
            self.inner.adjust_rating(id, rating_delta, count_delta).await
        }
    }

    #[async_trait]
    impl OrderRepository for FlakyRepo {
        async fn create_order(&self, order: Order) -> Result<Order, RepoError> {
            self.inner.create_order(order).await
        }
        async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
            self.inner.get_order(id).await
        }
        async fn list_orders(&self) -> Result<Vec<Order>, RepoError> {
            self.inner.list_orders().await
        }
        async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, RepoError> {
            self.inner.list_orders_for_user(user_id).await
        }
        async fn update_order(&self, order: Order) -> Result<Option<Order>, RepoError> {
            injected(&self.fail_order_update)?;
            self.inner.update_order(order).await
        }
        async fn delete_order(&self, id: Uuid) -> Result<bool, RepoError> {
            injected(&self.fail_order_delete)?;
            self.inner.delete_order(id).await
        }
    }

    #[async_trait]
    impl ReviewRepository for FlakyRepo {
        async fn create_review(&self, review: Review) -> Result<Review, RepoError> {
            self.inner.create_review(review).await
        }
        async fn get_review(&self, id: Uuid) -> Result<Option<Review>, RepoError> {
            self.inner.get_review(id).await
        }
        async fn find_review(&self, key: &ReviewKey) -> Result<Option<Review>, RepoError> {
            self.inner.find_review(key).await
        }
        async fn update_review(&self, review: Review) -> Result<Option<Review>, RepoError> {
            self.inner.update_review(review).await
        }
        async fn delete_review(&self, id: Uuid) -> Result<bool, RepoError> {
            self.inner.delete_review(id).await
        }
        async fn list_reviews(&self) -> Result<Vec<Review>, RepoError> {
            self.inner.list_reviews().await
        }
        async fn list_reviews_for_user(&self, user_id: Uuid) -> Result<Vec<Review>, RepoError> {
            self.inner.list_reviews_for_user(user_id).await
        }
    }

    #[async_trait]
    impl UserDirectory for FlakyRepo {
        async fn upsert_user(&self, profile: UserProfile) -> Result<UserProfile, RepoError> {
            self.inner.upsert_user(profile).await
        }
        async fn get_user(&self, id: Uuid) -> Result<Option<UserProfile>, RepoError> {
            self.inner.get_user(id).await
        }
    }

    pub(crate) async fn caller(repo: &InMemoryRepo, role: Role) -> Caller {
        let profile = UserProfile {
            id: Uuid::new_v4(),
            name: "Ann".into(),
            email: "ann@example.com".into(),
            address: "1 Main St".into(),
            role,
        };
        repo.upsert_user(profile.clone()).await.unwrap();
        Caller::from(profile)
    }

    pub(crate) async fn product(repo: &InMemoryRepo, price: i64, stocks: u32) -> Product {
        let p = Product::new("Widget".into(), "".into(), price, stocks, None, None).unwrap();
        repo.create_product(p).await.unwrap()
    }

    async fn stocks(repo: &InMemoryRepo, id: Uuid) -> u32 {
        repo.get_product(id).await.unwrap().unwrap().stocks
    }

    fn service(repo: &InMemoryRepo) -> (OrderService<InMemoryRepo>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (
            OrderService::new(Arc::new(repo.clone()), notifier.clone()),
            notifier,
        )
    }

    #[tokio::test]
    async fn create_order_snapshots_prices_and_decrements_stock() {
        let repo = InMemoryRepo::new();
        let (svc, _) = service(&repo);
        let ann = caller(&repo, Role::Customer).await;
        let p1 = product(&repo, 10, 5).await;
        let p2 = product(&repo, 5, 2).await;

        let order = svc
            .create_order(
                &ann,
                vec![LineRequest::new(p1.id, 3), LineRequest::new(p2.id, 1)],
            )
            .await
            .unwrap();
        assert_eq!(order.total_cents, 35);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.shipping_address, "1 Main St");
        assert_eq!(order.items[0].unit_price_cents, 10);
        assert_eq!(stocks(&repo, p1.id).await, 2);
        assert_eq!(stocks(&repo, p2.id).await, 1);
    }

    #[tokio::test]
    async fn create_order_failures_leave_stock_untouched() {
        let repo = InMemoryRepo::new();
        let (svc, _) = service(&repo);
        let ann = caller(&repo, Role::Customer).await;
        let p1 = product(&repo, 10, 5).await;
        let p2 = product(&repo, 5, 2).await;

        let res = svc.create_order(&ann, vec![LineRequest::new(p1.id, 6)]).await;
        assert!(matches!(res, Err(AppError::InsufficientStock { .. })));
        assert_eq!(stocks(&repo, p1.id).await, 5);

        let res = svc
            .create_order(
                &ann,
                vec![LineRequest::new(p1.id, 3), LineRequest::new(p2.id, 3)],
            )
            .await;
        assert!(matches!(res, Err(AppError::InsufficientStock { .. })));
        assert_eq!(stocks(&repo, p1.id).await, 5);
        assert_eq!(stocks(&repo, p2.id).await, 2);

        let res = svc
            .create_order(&ann, vec![LineRequest::new(Uuid::new_v4(), 1)])
            .await;
        assert!(matches!(res, Err(AppError::NotFound(_))));

        let res = svc.create_order(&ann, vec![]).await;
        assert!(matches!(res, Err(AppError::BadRequest(_))));
        assert!(repo.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_orders_for_last_unit() {
        let repo = InMemoryRepo::new();
        let (svc, _) = service(&repo);
        let svc = Arc::new(svc);
        let ann = caller(&repo, Role::Customer).await;
        let id = product(&repo, 100, 1).await.id;

        let attempts = (0..2).map(|_| {
            let svc = svc.clone();
            let ann = ann.clone();
            tokio::spawn(async move { svc.create_order(&ann, vec![LineRequest::new(id, 1)]).await })
        });
        let results: Vec<_> = futures::future::join_all(attempts)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AppError::InsufficientStock { .. }))));
        assert_eq!(stocks(&repo, id).await, 0);
    }

    #[tokio::test]
    async fn quantity_changes_redelta_stock() {
        let repo = InMemoryRepo::new();
        let (svc, _) = service(&repo);
        let ann = caller(&repo, Role::Customer).await;
        let p = product(&repo, 10, 5).await;
        let order = svc
            .create_order(&ann, vec![LineRequest::new(p.id, 2)])
            .await
            .unwrap();
        assert_eq!(stocks(&repo, p.id).await, 3);

        let up = svc.update_order_quantity(&ann, order.id, p.id, 4).await.unwrap();
        assert_eq!(up.total_cents, 40);
        assert_eq!(stocks(&repo, p.id).await, 1);

        let res = svc.update_order_quantity(&ann, order.id, p.id, 6).await;
        assert!(matches!(res, Err(AppError::InsufficientStock { .. })));
        assert_eq!(stocks(&repo, p.id).await, 1);
        assert_eq!(
            repo.get_order(order.id).await.unwrap().unwrap().total_cents,
            40
        );

        let down = svc.update_order_quantity(&ann, order.id, p.id, 1).await.unwrap();
        assert_eq!(down.total_cents, 10);
        assert_eq!(stocks(&repo, p.id).await, 4);

        let res = svc
            .update_order_quantity(&ann, order.id, Uuid::new_v4(), 1)
            .await;
        assert!(matches!(res, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn quantity_changes_require_pending_and_ownership() {
        let repo = InMemoryRepo::new();
        let (svc, _) = service(&repo);
        let ann = caller(&repo, Role::Customer).await;
        let bob = caller(&repo, Role::Customer).await;
        let p = product(&repo, 10, 5).await;
        let order = svc
            .create_order(&ann, vec![LineRequest::new(p.id, 1)])
            .await
            .unwrap();

        let res = svc.update_order_quantity(&bob, order.id, p.id, 2).await;
        assert!(matches!(res, Err(AppError::Forbidden(_))));

        svc.checkout_order(&ann, order.id, PaymentMethod::CreditCard)
            .await
            .unwrap();
        let res = svc.update_order_quantity(&ann, order.id, p.id, 2).await;
        assert!(matches!(res, Err(AppError::Conflict(_))));
        assert_eq!(stocks(&repo, p.id).await, 4);
    }

    #[tokio::test]
    async fn status_update_and_checkout_notify_after_commit() {
        let repo = InMemoryRepo::new();
        let (svc, notifier) = service(&repo);
        let ann = caller(&repo, Role::Customer).await;
        let p = product(&repo, 10, 5).await;
        let order = svc
            .create_order(&ann, vec![LineRequest::new(p.id, 1)])
            .await
            .unwrap();

        let updated = svc
            .update_order_status(&ann, order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Cancelled);

        let mut moved = ann.clone();
        moved.address = "9 New Rd".into();
        let checked = svc
            .checkout_order(&moved, order.id, PaymentMethod::CashOnDelivery)
            .await
            .unwrap();
        assert_eq!(checked.status, OrderStatus::Shipped);
        assert_eq!(checked.payment_method, Some(PaymentMethod::CashOnDelivery));
        assert_eq!(checked.shipping_address, "9 New Rd");

        let events = notifier.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, NotificationKind::StatusUpdated);
        assert_eq!(events[1].kind, NotificationKind::CheckoutConfirmed);
        assert_eq!(
            events[1].recipient.as_ref().map(|r| r.email.as_str()),
            Some("ann@example.com")
        );
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_the_update() {
        let repo = InMemoryRepo::new();
        let svc = OrderService::new(Arc::new(repo.clone()), Arc::new(FailingNotifier));
        let ann = caller(&repo, Role::Customer).await;
        let p = product(&repo, 10, 5).await;
        let order = svc
            .create_order(&ann, vec![LineRequest::new(p.id, 1)])
            .await
            .unwrap();

        let updated = svc
            .update_order_status(&ann, order.id, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Delivered);
        assert_eq!(
            repo.get_order(order.id).await.unwrap().unwrap().status,
            OrderStatus::Delivered
        );
    }

    #[tokio::test]
    async fn delete_restocks_pending_orders_only() {
        let repo = InMemoryRepo::new();
        let (svc, _) = service(&repo);
        let ann = caller(&repo, Role::Customer).await;
        let p = product(&repo, 10, 5).await;

        let order = svc
            .create_order(&ann, vec![LineRequest::new(p.id, 3)])
            .await
            .unwrap();
        assert_eq!(stocks(&repo, p.id).await, 2);
        svc.delete_order(&ann, order.id).await.unwrap();
        assert_eq!(stocks(&repo, p.id).await, 5);
        assert!(repo.get_order(order.id).await.unwrap().is_none());

        let shipped = svc
            .create_order(&ann, vec![LineRequest::new(p.id, 1)])
            .await
            .unwrap();
        svc.checkout_order(&ann, shipped.id, PaymentMethod::CreditCard)
            .await
            .unwrap();
        let res = svc.delete_order(&ann, shipped.id).await;
        assert!(matches!(res, Err(AppError::Conflict(_))));
        assert_eq!(stocks(&repo, p.id).await, 4);

        let res = svc.delete_order(&ann, Uuid::new_v4()).await;
        assert!(matches!(res, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_delete_keeps_order_and_its_reservation() {
        let repo = FlakyRepo::default();
        let svc = OrderService::new(
            Arc::new(repo.clone()),
            Arc::new(RecordingNotifier::default()),
        );
        let ann = caller(&repo.inner, Role::Customer).await;
        let p = product(&repo.inner, 10, 5).await;
        let order = svc
            .create_order(&ann, vec![LineRequest::new(p.id, 3)])
            .await
            .unwrap();
        assert_eq!(stocks(&repo.inner, p.id).await, 2);

        repo.fail_order_delete.store(true, Ordering::SeqCst);
        let res = svc.delete_order(&ann, order.id).await;
        assert!(matches!(res, Err(AppError::Dependency(_))));
        assert!(repo.inner.get_order(order.id).await.unwrap().is_some());
        assert_eq!(stocks(&repo.inner, p.id).await, 2);

        repo.fail_order_delete.store(false, Ordering::SeqCst);
        repo.fail_release.store(true, Ordering::SeqCst);
        let res = svc.delete_order(&ann, order.id).await;
        assert!(matches!(res, Err(AppError::Dependency(_))));
        assert!(repo.inner.get_order(order.id).await.unwrap().is_some());
        assert_eq!(stocks(&repo.inner, p.id).await, 2);

        repo.fail_release.store(false, Ordering::SeqCst);
        svc.delete_order(&ann, order.id).await.unwrap();
        assert!(repo.inner.get_order(order.id).await.unwrap().is_none());
        assert_eq!(stocks(&repo.inner, p.id).await, 5);
    }

    #[tokio::test]
    async fn oversized_order_total_releases_the_reservation() {
        let repo = InMemoryRepo::new();
        let (svc, _) = service(&repo);
        let ann = caller(&repo, Role::Customer).await;
        let p = product(&repo, i64::MAX / 2, 5).await;

        let res = svc.create_order(&ann, vec![LineRequest::new(p.id, 3)]).await;
        assert!(matches!(res, Err(AppError::BadRequest(_))));
        assert_eq!(stocks(&repo, p.id).await, 5);
        assert!(repo.list_orders().await.unwrap().is_empty());

        let order = svc
            .create_order(&ann, vec![LineRequest::new(p.id, 1)])
            .await
            .unwrap();
        let res = svc.update_order_quantity(&ann, order.id, p.id, 3).await;
        assert!(matches!(res, Err(AppError::BadRequest(_))));
        assert_eq!(stocks(&repo, p.id).await, 4);
        assert_eq!(
            repo.get_order(order.id).await.unwrap().unwrap().items[0].quantity,
            1
        );
    }

    #[tokio::test]
    async fn admins_act_on_any_order_and_see_all() {
        let repo = InMemoryRepo::new();
        let (svc, _) = service(&repo);
        let ann = caller(&repo, Role::Customer).await;
        let bob = caller(&repo, Role::Customer).await;
        let admin = caller(&repo, Role::Admin).await;
        let p = product(&repo, 10, 5).await;

        let order = svc
            .create_order(&ann, vec![LineRequest::new(p.id, 1)])
            .await
            .unwrap();
        svc.create_order(&bob, vec![LineRequest::new(p.id, 1)])
            .await
            .unwrap();

        let res = svc
            .update_order_status(&bob, order.id, OrderStatus::Cancelled)
            .await;
        assert!(matches!(res, Err(AppError::Forbidden(_))));
        svc.update_order_status(&admin, order.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        assert!(matches!(
            svc.list_all_orders(&ann).await,
            Err(AppError::Forbidden(_))
        ));
        let all = svc.list_all_orders(&admin).await.unwrap();
        assert_eq!(all.len(), 2);

        let mine = svc.list_user_orders(&ann).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].user.as_ref().map(|u| u.id), Some(ann.id));
        assert_eq!(
            mine[0].items[0].product.as_ref().map(|p| p.name.as_str()),
            Some("Widget")
        );
    }

    #[tokio::test]
    async fn sales_report_is_admin_only() {
        let repo = InMemoryRepo::new();
        let (svc, _) = service(&repo);
        let ann = caller(&repo, Role::Customer).await;
        let admin = caller(&repo, Role::Admin).await;
        let p = product(&repo, 10, 5).await;
        svc.create_order(&ann, vec![LineRequest::new(p.id, 2)])
            .await
            .unwrap();

        assert!(matches!(
            svc.sales_by_month(&ann).await,
            Err(AppError::Forbidden(_))
        ));
        let sales = svc.sales_by_month(&admin).await.unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].total_sales_cents, 20);
        assert_eq!(sales[0].order_count, 1);
    }
}
