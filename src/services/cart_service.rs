use crate::database::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::discount_service::calculate_discount;
use crate::utils::Clock;

/// Per-user cart against live product stock. Stock is validated at every
/// mutation; nothing is reserved until checkout actually decrements it.
#[derive(Clone)]
pub struct CartService {
    pool: DbPool,
    clock: Clock,
}

#[derive(sqlx::FromRow)]
struct CartLineRow {
    product_id: i64,
    product_name: String,
    product_image_url: Option<String>,
    unit_price: i64,
    quantity: i64,
    stock_available: i64,
}

impl CartService {
    pub fn new(pool: DbPool, clock: Clock) -> Self {
        Self { pool, clock }
    }

    pub async fn get_cart(&self, user_id: i64) -> AppResult<CartResponse> {
        let cart = self.get_or_create_cart(user_id).await?;
        self.build_cart_response(cart).await
    }

    pub async fn add_to_cart(&self, user_id: i64, req: AddToCartRequest) -> AppResult<CartResponse> {
        if req.quantity < 1 {
            return Err(AppError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let product = self.find_product(req.product_id).await?;
        let cart = self.get_or_create_cart(user_id).await?;

        match self.find_cart_item(cart.id, req.product_id).await? {
            Some(item) => {
                // Merging into an existing line: the stock check covers the
                // combined quantity, and the error reports how many more
                // can still be added.
                let merged = item.quantity + req.quantity;
                if product.quantity < merged {
                    return Err(AppError::InsufficientStock {
                        available: (product.quantity - item.quantity).max(0),
                    });
                }
                sqlx::query("UPDATE cart_items SET quantity = ? WHERE id = ?")
                    .bind(merged)
                    .bind(item.id)
                    .execute(&self.pool)
                    .await?;
            }
            None => {
                if product.quantity < req.quantity {
                    return Err(AppError::InsufficientStock {
                        available: product.quantity,
                    });
                }
                self.insert_cart_item(cart.id, &product, req.quantity).await?;
            }
        }

        self.touch_cart(cart.id).await?;
        self.get_cart(user_id).await
    }

    pub async fn update_cart_item(
        &self,
        user_id: i64,
        req: UpdateCartItemRequest,
    ) -> AppResult<CartResponse> {
        if req.quantity < 1 {
            return Err(AppError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let product = self.find_product(req.product_id).await?;
        let cart = self.get_or_create_cart(user_id).await?;
        let item = self
            .find_cart_item(cart.id, req.product_id)
            .await?
            .ok_or(AppError::CartItemNotFound)?;

        // Absolute quantity, not a delta.
        if product.quantity < req.quantity {
            return Err(AppError::InsufficientStock {
                available: product.quantity,
            });
        }

        sqlx::query("UPDATE cart_items SET quantity = ? WHERE id = ?")
            .bind(req.quantity)
            .bind(item.id)
            .execute(&self.pool)
            .await?;

        self.touch_cart(cart.id).await?;
        self.get_cart(user_id).await
    }

    /// Removing a line that is not there is a no-op, not an error.
    pub async fn remove_from_cart(&self, user_id: i64, product_id: i64) -> AppResult<CartResponse> {
        let cart = self.get_or_create_cart(user_id).await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = ? AND product_id = ?")
            .bind(cart.id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        self.touch_cart(cart.id).await?;
        self.get_cart(user_id).await
    }

    pub async fn clear_cart(&self, user_id: i64) -> AppResult<CartResponse> {
        let cart = self.get_or_create_cart(user_id).await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?")
            .bind(cart.id)
            .execute(&self.pool)
            .await?;

        self.touch_cart(cart.id).await?;
        self.get_cart(user_id).await
    }

    /// Merge a guest cart carried in client storage. The merge is lossy:
    /// unknown products and over-stock requests are skipped silently, and
    /// lines present on both sides take the larger quantity, clamped to
    /// stock. Login must never fail because of a stale local cart.
    pub async fn sync_cart(&self, user_id: i64, req: SyncCartRequest) -> AppResult<CartResponse> {
        let cart = self.get_or_create_cart(user_id).await?;

        for incoming in &req.items {
            if incoming.quantity < 1 {
                continue;
            }
            let Some(product) = self.try_find_product(incoming.product_id).await? else {
                continue;
            };
            if product.quantity < incoming.quantity {
                continue;
            }

            match self.find_cart_item(cart.id, incoming.product_id).await? {
                Some(item) => {
                    let merged = item.quantity.max(incoming.quantity).min(product.quantity);
                    sqlx::query("UPDATE cart_items SET quantity = ? WHERE id = ?")
                        .bind(merged)
                        .bind(item.id)
                        .execute(&self.pool)
                        .await?;
                }
                None => {
                    self.insert_cart_item(cart.id, &product, incoming.quantity)
                        .await?;
                }
            }
        }

        self.touch_cart(cart.id).await?;
        self.get_cart(user_id).await
    }

    // --- internals --------------------------------------------------------

    pub(crate) async fn find_cart(&self, user_id: i64) -> AppResult<Option<Cart>> {
        let cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(cart)
    }

    async fn get_or_create_cart(&self, user_id: i64) -> AppResult<Cart> {
        if let Some(cart) = self.find_cart(user_id).await? {
            return Ok(cart);
        }

        let now = self.clock.now();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO carts (user_id, created_at, updated_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Cart {
            id,
            user_id,
            discount_code_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn try_find_product(&self, product_id: i64) -> AppResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    async fn find_product(&self, product_id: i64) -> AppResult<Product> {
        self.try_find_product(product_id)
            .await?
            .ok_or(AppError::ProductNotFound)
    }

    async fn find_cart_item(&self, cart_id: i64, product_id: i64) -> AppResult<Option<CartItem>> {
        let item = sqlx::query_as::<_, CartItem>(
            "SELECT * FROM cart_items WHERE cart_id = ? AND product_id = ?",
        )
        .bind(cart_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn insert_cart_item(
        &self,
        cart_id: i64,
        product: &Product,
        quantity: i64,
    ) -> AppResult<()> {
        // Price is captured here and not live-repriced afterwards.
        sqlx::query(
            "INSERT INTO cart_items (cart_id, product_id, quantity, unit_price, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(cart_id)
        .bind(product.id)
        .bind(quantity)
        .bind(product.price)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch_cart(&self, cart_id: i64) -> AppResult<()> {
        sqlx::query("UPDATE carts SET updated_at = ? WHERE id = ?")
            .bind(self.clock.now())
            .bind(cart_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Totals are derived, never stored: subtotal from the lines, discount
    /// from the applied code against the current subtotal.
    pub(crate) async fn build_cart_response(&self, cart: Cart) -> AppResult<CartResponse> {
        let lines = sqlx::query_as::<_, CartLineRow>(
            "SELECT ci.product_id, p.name AS product_name, p.image_url AS product_image_url, \
                    ci.unit_price, ci.quantity, p.quantity AS stock_available \
             FROM cart_items ci \
             JOIN products p ON p.id = ci.product_id \
             WHERE ci.cart_id = ? \
             ORDER BY ci.id",
        )
        .bind(cart.id)
        .fetch_all(&self.pool)
        .await?;

        let subtotal: i64 = lines.iter().map(|l| l.unit_price * l.quantity).sum();

        let (discount_code, discount_amount) = match cart.discount_code_id {
            Some(code_id) => {
                let code = sqlx::query_as::<_, DiscountCode>(
                    "SELECT * FROM discount_codes WHERE id = ?",
                )
                .bind(code_id)
                .fetch_optional(&self.pool)
                .await?;
                match code {
                    Some(code) => {
                        let amount = calculate_discount(subtotal, &code);
                        (Some(code.code), amount)
                    }
                    None => (None, 0),
                }
            }
            None => (None, 0),
        };

        let items = lines
            .into_iter()
            .map(|l| CartItemResponse {
                product_id: l.product_id,
                product_name: l.product_name,
                product_image_url: l.product_image_url,
                line_total: l.unit_price * l.quantity,
                unit_price: l.unit_price,
                quantity: l.quantity,
                stock_available: l.stock_available,
            })
            .collect();

        Ok(CartResponse {
            id: cart.id,
            user_id: cart.user_id,
            updated_at: cart.updated_at,
            items,
            subtotal,
            discount_code,
            discount_amount,
            total: subtotal - discount_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;

    struct Ctx {
        pool: DbPool,
        service: CartService,
    }

    async fn setup() -> Ctx {
        let pool = test_pool().await;
        let clock = Clock::fixed(utc("2026-01-15T00:00:00Z"));
        let service = CartService::new(pool.clone(), clock);
        Ctx { pool, service }
    }

    #[tokio::test]
    async fn cart_is_created_lazily_and_captures_price_at_add_time() {
        let ctx = setup().await;
        let user_id = insert_user(&ctx.pool, "minh@example.com").await;
        let product_id = insert_product(&ctx.pool, "Yoga Mat", 150000, 30).await;

        let cart = ctx
            .service
            .add_to_cart(
                user_id,
                AddToCartRequest {
                    product_id,
                    quantity: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].unit_price, 150000);
        assert_eq!(cart.subtotal, 300000);

        // A later price hike does not reprice the line.
        sqlx::query("UPDATE products SET price = 180000 WHERE id = ?")
            .bind(product_id)
            .execute(&ctx.pool)
            .await
            .unwrap();
        let cart = ctx.service.get_cart(user_id).await.unwrap();
        assert_eq!(cart.items[0].unit_price, 150000);
        assert_eq!(cart.subtotal, 300000);
    }

    #[tokio::test]
    async fn add_merges_lines_and_guards_combined_stock() {
        let ctx = setup().await;
        let user_id = insert_user(&ctx.pool, "minh@example.com").await;
        let product_id = insert_product(&ctx.pool, "Shaker Bottle", 80000, 5).await;

        ctx.service
            .add_to_cart(
                user_id,
                AddToCartRequest {
                    product_id,
                    quantity: 3,
                },
            )
            .await
            .unwrap();

        // 3 already in the cart, stock 5: only 2 more fit.
        let err = ctx
            .service
            .add_to_cart(
                user_id,
                AddToCartRequest {
                    product_id,
                    quantity: 3,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { available: 2 }));

        // The failed add left the line unchanged.
        let cart = ctx.service.get_cart(user_id).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3);

        let cart = ctx
            .service
            .add_to_cart(
                user_id,
                AddToCartRequest {
                    product_id,
                    quantity: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(cart.items[0].quantity, 5);
    }

    #[tokio::test]
    async fn add_unknown_product_or_over_stock() {
        let ctx = setup().await;
        let user_id = insert_user(&ctx.pool, "minh@example.com").await;
        let product_id = insert_product(&ctx.pool, "Treadmill", 12000000, 2).await;

        let err = ctx
            .service
            .add_to_cart(
                user_id,
                AddToCartRequest {
                    product_id: 999,
                    quantity: 1,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProductNotFound));

        let err = ctx
            .service
            .add_to_cart(
                user_id,
                AddToCartRequest {
                    product_id,
                    quantity: 3,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { available: 2 }));
    }

    #[tokio::test]
    async fn update_sets_absolute_quantity_with_stock_check() {
        let ctx = setup().await;
        let user_id = insert_user(&ctx.pool, "minh@example.com").await;
        let product_id = insert_product(&ctx.pool, "Jump Rope", 50000, 4).await;

        let err = ctx
            .service
            .update_cart_item(
                user_id,
                UpdateCartItemRequest {
                    product_id,
                    quantity: 1,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CartItemNotFound));

        ctx.service
            .add_to_cart(
                user_id,
                AddToCartRequest {
                    product_id,
                    quantity: 3,
                },
            )
            .await
            .unwrap();

        let cart = ctx
            .service
            .update_cart_item(
                user_id,
                UpdateCartItemRequest {
                    product_id,
                    quantity: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(cart.items[0].quantity, 2);

        let err = ctx
            .service
            .update_cart_item(
                user_id,
                UpdateCartItemRequest {
                    product_id,
                    quantity: 5,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { available: 4 }));
    }

    #[tokio::test]
    async fn remove_is_idempotent_and_clear_keeps_the_cart_row() {
        let ctx = setup().await;
        let user_id = insert_user(&ctx.pool, "minh@example.com").await;
        let product_id = insert_product(&ctx.pool, "Kettlebell 12kg", 450000, 12).await;

        ctx.service
            .add_to_cart(
                user_id,
                AddToCartRequest {
                    product_id,
                    quantity: 1,
                },
            )
            .await
            .unwrap();

        let cart = ctx.service.remove_from_cart(user_id, product_id).await.unwrap();
        assert!(cart.items.is_empty());

        // Removing again is a no-op.
        let cart = ctx.service.remove_from_cart(user_id, product_id).await.unwrap();
        assert!(cart.items.is_empty());

        let first_id = cart.id;
        let cart = ctx.service.clear_cart(user_id).await.unwrap();
        assert_eq!(cart.id, first_id);
        assert!(cart.items.is_empty());
    }

    #[tokio::test]
    async fn sync_merges_guest_cart_with_stock_clamp() {
        let ctx = setup().await;
        let user_id = insert_user(&ctx.pool, "minh@example.com").await;
        let shared = insert_product(&ctx.pool, "Resistance Band", 60000, 4).await;
        let guest_only = insert_product(&ctx.pool, "Pull-up Bar", 500000, 10).await;
        let scarce = insert_product(&ctx.pool, "Protein Powder", 1200000, 1).await;

        ctx.service
            .add_to_cart(
                user_id,
                AddToCartRequest {
                    product_id: shared,
                    quantity: 3,
                },
            )
            .await
            .unwrap();

        let cart = ctx
            .service
            .sync_cart(
                user_id,
                SyncCartRequest {
                    items: vec![
                        // On both sides: max(3, 5) clamped to stock 4.
                        SyncCartItem {
                            product_id: shared,
                            quantity: 5,
                        },
                        // Guest only: inserted as-is.
                        SyncCartItem {
                            product_id: guest_only,
                            quantity: 2,
                        },
                        // Over stock: silently skipped.
                        SyncCartItem {
                            product_id: scarce,
                            quantity: 3,
                        },
                        // Unknown product: silently skipped.
                        SyncCartItem {
                            product_id: 999,
                            quantity: 1,
                        },
                    ],
                },
            )
            .await
            .unwrap();

        assert_eq!(cart.items.len(), 2);
        let shared_line = cart
            .items
            .iter()
            .find(|i| i.product_id == shared)
            .unwrap();
        assert_eq!(shared_line.quantity, 4);
        let guest_line = cart
            .items
            .iter()
            .find(|i| i.product_id == guest_only)
            .unwrap();
        assert_eq!(guest_line.quantity, 2);
    }
}
