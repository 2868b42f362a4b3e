use std::collections::HashMap;
use std::sync::Arc;

use storefront_types::domain::caller::{Caller, UserSummary};
use storefront_types::domain::review::{Rating, Review, ReviewKey, ReviewStatus};
use storefront_types::domain::views::{OrderSummary, ProductSummary, ReviewView};
use storefront_types::ports::{RepoError, StoreRepository};
use uuid::Uuid;

use super::locks::KeyedLocks;
use super::order_service::OrderService;
use crate::errors::AppError;

/// Result of a review submission.
#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    Created(Review),
    Updated(Review),
}

impl ReviewOutcome {
    pub fn review(&self) -> &Review {
        match self {
            ReviewOutcome::Created(r) | ReviewOutcome::Updated(r) => r,
        }
    }
}

/// Reviews and the product rating aggregates they feed.
pub struct ReviewService<R: StoreRepository> {
    repo: Arc<R>,
    orders: Arc<OrderService<R>>,
    review_locks: KeyedLocks<ReviewKey>,
}

fn parse_rating(raw: i64) -> Result<Rating, AppError> {
    Rating::try_from(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}

impl<R: StoreRepository> ReviewService<R> {
    pub fn new(orders: Arc<OrderService<R>>) -> Self {
        Self {
            repo: orders.repo().clone(),
            orders,
            review_locks: KeyedLocks::new(),
        }
    }

    /// Creates the caller's review of `product_id` within `order_id`, or
    /// revises it if one already exists. Either way the order ends `success`.
    pub async fn add_or_update_review(
        &self,
        caller: &Caller,
        product_id: Uuid,
        order_id: Uuid,
        rating: i64,
        comment: String,
    ) -> Result<ReviewOutcome, AppError> {
        let rating = parse_rating(rating)?;
        let key = ReviewKey {
            user_id: caller.id,
            product_id,
            order_id,
        };
        let _guard = self.review_locks.lock(key).await;
        // Held through the status change so the order cannot move under the review.
        let _order_guard = self.orders.lock_order(order_id).await;

        let order = self.orders.load_order(order_id).await?;
        if !caller.may_act_on(order.user_id) {
            return Err(AppError::Forbidden(format!(
                "not allowed to review order {order_id}"
            )));
        }
        if order.line(product_id).is_none() {
            return Err(AppError::NotFound(format!(
                "product {product_id} in order {order_id}"
            )));
        }
        if !order.status.allows_review() {
            return Err(AppError::Conflict(format!(
                "order {order_id} is {}; only shipped or delivered orders can be reviewed",
                order.status
            )));
        }

        let previous = self.repo.find_review(&key).await?;
        let outcome = match previous.clone() {
            Some(existing) => ReviewOutcome::Updated(self.revise(existing, rating, comment).await?),
            None => ReviewOutcome::Created(self.create(key, rating, comment).await?),
        };
        if let Err(e) = self.orders.mark_reviewed(order).await {
            self.undo(&outcome, previous).await;
            return Err(e);
        }
        Ok(outcome)
    }

    /// Corrects a review that was already resubmitted once.
    pub async fn update_review(
        &self,
        caller: &Caller,
        review_id: Uuid,
        rating: i64,
        comment: String,
    ) -> Result<Review, AppError> {
        let rating = parse_rating(rating)?;
        let found = self.load_review(review_id).await?;
        let _guard = self.review_locks.lock(found.key()).await;

        let review = self.load_review(review_id).await?;
        if review.status != ReviewStatus::Reviewed {
            return Err(AppError::NotFound(format!("reviewed review {review_id}")));
        }
        if !caller.may_act_on(review.user_id) {
            return Err(AppError::Forbidden(format!(
                "not allowed to modify review {review_id}"
            )));
        }
        self.revise(review, rating, comment).await
    }

    pub async fn delete_review(&self, caller: &Caller, review_id: Uuid) -> Result<(), AppError> {
        let found = self.load_review(review_id).await?;
        if !caller.may_act_on(found.user_id) {
            return Err(AppError::Forbidden(format!(
                "not allowed to delete review {review_id}"
            )));
        }
        let _guard = self.review_locks.lock(found.key()).await;
        let review = self.load_review(review_id).await?;

        if !self.repo.delete_review(review_id).await? {
            return Err(AppError::NotFound(format!("review {review_id}")));
        }
        let rating = i64::from(review.rating.value());
        match self.repo.adjust_rating(review.product_id, -rating, -1).await {
            Ok(_) => {}
            Err(RepoError::NotFound(what)) => {
                tracing::warn!(%review_id, what, "reviewed product is gone; aggregate skipped");
            }
            Err(e) => {
                if let Err(undo) = self.repo.create_review(review).await {
                    tracing::error!(%review_id, error = %undo, "failed to restore review");
                }
                return Err(e.into());
            }
        }
        tracing::info!(%review_id, product_id = %review.product_id, rating, "review deleted");
        Ok(())
    }

    pub async fn user_review_history(&self, caller: &Caller) -> Result<Vec<ReviewView>, AppError> {
        let reviews = self
            .repo
            .list_reviews_for_user(caller.id)
            .await?
            .into_iter()
            .filter(|r| r.status == ReviewStatus::Reviewed)
            .collect();
        self.project(reviews).await
    }

    pub async fn list_all_reviews(&self, caller: &Caller) -> Result<Vec<ReviewView>, AppError> {
        if !caller.is_admin() {
            return Err(AppError::Forbidden("admin only".into()));
        }
        let reviews = self.repo.list_reviews().await?;
        self.project(reviews).await
    }

    async fn load_review(&self, review_id: Uuid) -> Result<Review, AppError> {
        self.repo
            .get_review(review_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("review {review_id}")))
    }

    async fn create(&self, key: ReviewKey, rating: Rating, comment: String) -> Result<Review, AppError> {
        let review = self
            .repo
            .create_review(Review::new(key, rating, comment))
            .await?;
        if let Err(e) = self
            .repo
            .adjust_rating(key.product_id, i64::from(rating.value()), 1)
            .await
        {
            if let Err(undo) = self.repo.delete_review(review.id).await {
                tracing::error!(review_id = %review.id, error = %undo, "failed to drop review");
            }
            return Err(e.into());
        }
        tracing::info!(
            review_id = %review.id,
            product_id = %key.product_id,
            rating = rating.value(),
            "review created"
        );
        Ok(review)
    }

    async fn revise(&self, mut review: Review, rating: Rating, comment: String) -> Result<Review, AppError> {
        let previous = review.clone();
        let delta = review.revise(rating, comment);
        let review_id = review.id;
        let updated = self
            .repo
            .update_review(review)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("review {review_id}")))?;
        if delta != 0 {
            if let Err(e) = self.repo.adjust_rating(updated.product_id, delta, 0).await {
                if let Err(undo) = self.repo.update_review(previous).await {
                    tracing::error!(%review_id, error = %undo, "failed to restore review");
                }
                return Err(e.into());
            }
        }
        tracing::info!(%review_id, delta, "review revised");
        Ok(updated)
    }

    /// Reverts a submission whose order could not be marked reviewed.
    async fn undo(&self, outcome: &ReviewOutcome, previous: Option<Review>) {
        let applied = outcome.review();
        let review_id = applied.id;
        let (rating_delta, count_delta) = match &previous {
            Some(prev) => (
                i64::from(prev.rating.value()) - i64::from(applied.rating.value()),
                0,
            ),
            None => (-i64::from(applied.rating.value()), -1),
        };
        let restored = match previous {
            Some(prev) => self.repo.update_review(prev).await.map(|_| ()),
            None => self.repo.delete_review(review_id).await.map(|_| ()),
        };
        if let Err(e) = restored {
            tracing::error!(%review_id, error = %e, "failed to restore review");
        }
        if rating_delta != 0 || count_delta != 0 {
            if let Err(e) = self
                .repo
                .adjust_rating(applied.product_id, rating_delta, count_delta)
                .await
            {
                tracing::error!(%review_id, error = %e, "failed to restore rating aggregate");
            }
        }
    }

    async fn project(&self, reviews: Vec<Review>) -> Result<Vec<ReviewView>, AppError> {
        let products: HashMap<Uuid, ProductSummary> = self
            .repo
            .list_products()
            .await?
            .iter()
            .map(|p| (p.id, ProductSummary::from(p)))
            .collect();

        let mut users: HashMap<Uuid, Option<UserSummary>> = HashMap::new();
        let mut orders: HashMap<Uuid, Option<OrderSummary>> = HashMap::new();
        let mut views = Vec::with_capacity(reviews.len());
        for review in reviews {
            if !users.contains_key(&review.user_id) {
                let user = self.repo.get_user(review.user_id).await?;
                users.insert(review.user_id, user.as_ref().map(UserSummary::from));
            }
            if !orders.contains_key(&review.order_id) {
                let order = self.repo.get_order(review.order_id).await?;
                orders.insert(review.order_id, order.as_ref().map(OrderSummary::from));
            }
            views.push(ReviewView {
                user: users.get(&review.user_id).cloned().flatten(),
                product: products.get(&review.product_id).cloned(),
                order: orders.get(&review.order_id).cloned().flatten(),
                review,
            });
        }
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::order_service::tests::{caller, product, FlakyRepo, RecordingNotifier};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use storefront_repo::memory::InMemoryRepo;
    use storefront_types::domain::caller::Role;
    use storefront_types::domain::order::{LineRequest, OrderStatus, PaymentMethod};
    use storefront_types::domain::product::Product;
    use storefront_types::ports::catalog_repository::CatalogRepository;
    use storefront_types::ports::order_repository::OrderRepository;
    use storefront_types::ports::review_repository::ReviewRepository;

    struct Fixture {
        repo: InMemoryRepo,
        orders: Arc<OrderService<InMemoryRepo>>,
        reviews: ReviewService<InMemoryRepo>,
        ann: Caller,
        product: Product,
        order_id: Uuid,
    }

    async fn shipped_order() -> Fixture {
        let repo = InMemoryRepo::new();
        let orders = Arc::new(OrderService::new(
            Arc::new(repo.clone()),
            Arc::new(RecordingNotifier::default()),
        ));
        let reviews = ReviewService::new(orders.clone());
        let ann = caller(&repo, Role::Customer).await;
        let product = product(&repo, 10, 5).await;
        let order = orders
            .create_order(&ann, vec![LineRequest::new(product.id, 1)])
            .await
            .unwrap();
        orders
            .checkout_order(&ann, order.id, PaymentMethod::CreditCard)
            .await
            .unwrap();
        Fixture {
            repo,
            orders,
            reviews,
            ann,
            product,
            order_id: order.id,
        }
    }

    async fn aggregate(repo: &InMemoryRepo, id: Uuid) -> (u32, u32) {
        let p = repo.get_product(id).await.unwrap().unwrap();
        (p.total_ratings, p.rating_count)
    }

    #[tokio::test]
    async fn first_review_creates_pending_and_counts() {
        let f = shipped_order().await;
        let outcome = f
            .reviews
            .add_or_update_review(&f.ann, f.product.id, f.order_id, 4, "good".into())
            .await
            .unwrap();
        let review = match outcome {
            ReviewOutcome::Created(r) => r,
            other => panic!("expected a new review, got {other:?}"),
        };
        assert_eq!(review.status, ReviewStatus::Pending);
        assert_eq!(aggregate(&f.repo, f.product.id).await, (4, 1));
        assert_eq!(
            f.repo.get_order(f.order_id).await.unwrap().unwrap().status,
            OrderStatus::Success
        );
    }

    #[tokio::test]
    async fn resubmission_applies_the_delta_once() {
        let f = shipped_order().await;
        f.reviews
            .add_or_update_review(&f.ann, f.product.id, f.order_id, 4, "good".into())
            .await
            .unwrap();
        let outcome = f
            .reviews
            .add_or_update_review(&f.ann, f.product.id, f.order_id, 2, "meh".into())
            .await
            .unwrap();
        assert!(matches!(outcome, ReviewOutcome::Updated(_)));
        assert_eq!(outcome.review().status, ReviewStatus::Reviewed);
        assert_eq!(outcome.review().rating.value(), 2);

        assert_eq!(aggregate(&f.repo, f.product.id).await, (2, 1));
        assert_eq!(f.repo.list_reviews().await.unwrap().len(), 1);
        assert_eq!(
            f.repo.get_order(f.order_id).await.unwrap().unwrap().status,
            OrderStatus::Success
        );
    }

    #[tokio::test]
    async fn review_preconditions() {
        let f = shipped_order().await;
        let res = f
            .reviews
            .add_or_update_review(&f.ann, f.product.id, f.order_id, 6, "".into())
            .await;
        assert!(matches!(res, Err(AppError::BadRequest(_))));

        let res = f
            .reviews
            .add_or_update_review(&f.ann, f.product.id, Uuid::new_v4(), 3, "".into())
            .await;
        assert!(matches!(res, Err(AppError::NotFound(_))));

        let res = f
            .reviews
            .add_or_update_review(&f.ann, Uuid::new_v4(), f.order_id, 3, "".into())
            .await;
        assert!(matches!(res, Err(AppError::NotFound(_))));

        let bob = caller(&f.repo, Role::Customer).await;
        let res = f
            .reviews
            .add_or_update_review(&bob, f.product.id, f.order_id, 3, "".into())
            .await;
        assert!(matches!(res, Err(AppError::Forbidden(_))));

        let pending = f
            .orders
            .create_order(&f.ann, vec![LineRequest::new(f.product.id, 1)])
            .await
            .unwrap();
        let res = f
            .reviews
            .add_or_update_review(&f.ann, f.product.id, pending.id, 3, "".into())
            .await;
        assert!(matches!(res, Err(AppError::Conflict(_))));

        assert_eq!(aggregate(&f.repo, f.product.id).await, (0, 0));
    }

    #[tokio::test]
    async fn update_review_requires_reviewed_status() {
        let f = shipped_order().await;
        let created = f
            .reviews
            .add_or_update_review(&f.ann, f.product.id, f.order_id, 5, "great".into())
            .await
            .unwrap();
        let id = created.review().id;

        let res = f.reviews.update_review(&f.ann, id, 3, "hm".into()).await;
        assert!(matches!(res, Err(AppError::NotFound(_))));

        f.reviews
            .add_or_update_review(&f.ann, f.product.id, f.order_id, 4, "ok".into())
            .await
            .unwrap();
        let updated = f
            .reviews
            .update_review(&f.ann, id, 1, "bad".into())
            .await
            .unwrap();
        assert_eq!(updated.rating.value(), 1);
        assert_eq!(aggregate(&f.repo, f.product.id).await, (1, 1));
    }

    #[tokio::test]
    async fn delete_review_rolls_back_the_aggregate() {
        let f = shipped_order().await;
        let created = f
            .reviews
            .add_or_update_review(&f.ann, f.product.id, f.order_id, 3, "fine".into())
            .await
            .unwrap();
        let id = created.review().id;

        let bob = caller(&f.repo, Role::Customer).await;
        let res = f.reviews.delete_review(&bob, id).await;
        assert!(matches!(res, Err(AppError::Forbidden(_))));

        f.reviews.delete_review(&f.ann, id).await.unwrap();
        assert_eq!(aggregate(&f.repo, f.product.id).await, (0, 0));
        assert_eq!(
            f.repo.get_order(f.order_id).await.unwrap().unwrap().status,
            OrderStatus::Success
        );

        let res = f.reviews.delete_review(&f.ann, id).await;
        assert!(matches!(res, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn history_and_admin_listing() {
        let f = shipped_order().await;
        let admin = caller(&f.repo, Role::Admin).await;
        f.reviews
            .add_or_update_review(&f.ann, f.product.id, f.order_id, 4, "good".into())
            .await
            .unwrap();
        assert!(f.reviews.user_review_history(&f.ann).await.unwrap().is_empty());

        f.reviews
            .add_or_update_review(&f.ann, f.product.id, f.order_id, 5, "better".into())
            .await
            .unwrap();
        let history = f.reviews.user_review_history(&f.ann).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].product.as_ref().map(|p| p.id),
            Some(f.product.id)
        );

        assert!(matches!(
            f.reviews.list_all_reviews(&f.ann).await,
            Err(AppError::Forbidden(_))
        ));
        let all = f.reviews.list_all_reviews(&admin).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].user.as_ref().map(|u| u.id), Some(f.ann.id));
        assert_eq!(
            all[0].order.as_ref().map(|o| o.status),
            Some(OrderStatus::Success)
        );
    }

    #[tokio::test]
    async fn failed_status_change_reverts_the_submission() {
        let repo = FlakyRepo::default();
        let orders = Arc::new(OrderService::new(
            Arc::new(repo.clone()),
            Arc::new(RecordingNotifier::default()),
        ));
        let reviews = ReviewService::new(orders.clone());
        let ann = caller(&repo.inner, Role::Customer).await;
        let p = product(&repo.inner, 10, 5).await;
        let order = orders
            .create_order(&ann, vec![LineRequest::new(p.id, 1)])
            .await
            .unwrap();
        orders
            .checkout_order(&ann, order.id, PaymentMethod::CreditCard)
            .await
            .unwrap();

        repo.fail_order_update.store(true, Ordering::SeqCst);
        let res = reviews
            .add_or_update_review(&ann, p.id, order.id, 4, "good".into())
            .await;
        assert!(matches!(res, Err(AppError::Dependency(_))));
        assert!(repo.inner.list_reviews().await.unwrap().is_empty());
        assert_eq!(aggregate(&repo.inner, p.id).await, (0, 0));

        repo.fail_order_update.store(false, Ordering::SeqCst);
        let first = reviews
            .add_or_update_review(&ann, p.id, order.id, 4, "good".into())
            .await
            .unwrap();
        orders
            .update_order_status(&ann, order.id, OrderStatus::Shipped)
            .await
            .unwrap();

        repo.fail_order_update.store(true, Ordering::SeqCst);
        let res = reviews
            .add_or_update_review(&ann, p.id, order.id, 2, "meh".into())
            .await;
        assert!(matches!(res, Err(AppError::Dependency(_))));
        let stored = repo.inner.get_review(first.review().id).await.unwrap().unwrap();
        assert_eq!(stored.rating.value(), 4);
        assert_eq!(stored.status, ReviewStatus::Pending);
        assert_eq!(aggregate(&repo.inner, p.id).await, (4, 1));
        assert_eq!(
            repo.inner.get_order(order.id).await.unwrap().unwrap().status,
            OrderStatus::Shipped
        );
    }

    #[tokio::test]
    async fn submission_waits_for_the_order_lock() {
        let f = shipped_order().await;
        let reviews = Arc::new(f.reviews);
        let guard = f.orders.lock_order(f.order_id).await;

        let pending = {
            let reviews = reviews.clone();
            let ann = f.ann.clone();
            let (product_id, order_id) = (f.product.id, f.order_id);
            tokio::spawn(async move {
                reviews
                    .add_or_update_review(&ann, product_id, order_id, 5, "".into())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());
        assert_eq!(aggregate(&f.repo, f.product.id).await, (0, 0));

        drop(guard);
        pending.await.unwrap().unwrap();
        assert_eq!(aggregate(&f.repo, f.product.id).await, (5, 1));
    }

    #[tokio::test]
    async fn concurrent_submissions_keep_one_review() {
        let f = shipped_order().await;
        let reviews = Arc::new(f.reviews);
        let handles: Vec<_> = (1..=5)
            .map(|rating| {
                let reviews = reviews.clone();
                let ann = f.ann.clone();
                let (product_id, order_id) = (f.product.id, f.order_id);
                tokio::spawn(async move {
                    reviews
                        .add_or_update_review(&ann, product_id, order_id, rating, "".into())
                        .await
                })
            })
            .collect();
        for h in futures::future::join_all(handles).await {
            h.unwrap().unwrap();
        }

        let stored = f.repo.list_reviews().await.unwrap();
        assert_eq!(stored.len(), 1);
        let (total, count) = aggregate(&f.repo, f.product.id).await;
        assert_eq!(count, 1);
        assert_eq!(total, u32::from(stored[0].rating.value()));
    }
}
