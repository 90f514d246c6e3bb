use std::sync::Arc;

use serde_json::Value;
use shared::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{decode, Backend, Procedure, Record, SqlParam, StoreError};

const INSERT_CUSTOMER: &str = "
    INSERT INTO customer (first_name, middle_name, last_name, contact, address)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING customer_id";

const CUSTOMER_COLUMNS: &str =
    "customer_id, first_name, middle_name, last_name, contact, address, created_at";

const INSERT_PRODUCT: &str = "
    INSERT INTO products (product_name, category, price)
    VALUES ($1, $2, $3::numeric)";

const ALL_PRODUCTS: &str = "
    SELECT product_id, product_name, category, price
    FROM products
    ORDER BY category, product_name";

const ORDER_DETAILS: &str = "
    SELECT
        o.order_id,
        o.order_status,
        o.expected_delivery,
        o.has_paid,
        o.spl_instructions,
        o.created_at,
        c.first_name,
        c.last_name,
        c.contact,
        c.address,
        calculate_order_total(o.order_id) AS total_amount,
        get_order_location(o.order_id) AS current_location,
        is_order_delayed(o.order_id) AS is_delayed
    FROM orders o
    INNER JOIN customer c ON o.customer_id = c.customer_id
    WHERE o.order_id = $1";

const ORDER_PRODUCTS: &str = "
    SELECT
        p.product_name,
        p.category,
        p.price,
        op.quantity,
        (p.price * op.quantity) AS subtotal
    FROM order_product op
    INNER JOIN products p ON op.product_id = p.product_id
    WHERE op.order_id = $1
    ORDER BY p.product_name";

const ALL_ORDERS: &str = "
    SELECT
        o.order_id,
        concat_ws(' ', c.first_name, c.last_name) AS customer_name,
        o.order_status,
        o.expected_delivery,
        o.has_paid,
        calculate_order_total(o.order_id) AS total_amount,
        o.created_at
    FROM orders o
    INNER JOIN customer c ON o.customer_id = c.customer_id
    ORDER BY o.created_at DESC, o.order_id DESC";

const TRACKING_HISTORY: &str = "
    SELECT
        t.location,
        t.status,
        t.event_time AS \"timestamp\",
        v.vehicle_no,
        v.driver_name
    FROM tracking_info t
    LEFT JOIN vehicle_info v ON t.vehicle_id = v.vehicle_id
    WHERE t.order_id = $1
    ORDER BY t.event_time ASC, t.tracking_id ASC";

const ORDER_HISTORY: &str = "
    SELECT status, event_time AS \"timestamp\"
    FROM order_history
    WHERE order_id = $1
    ORDER BY event_time ASC, history_id ASC";

const ALL_VEHICLES: &str = "
    SELECT vehicle_id, vehicle_no, driver_name, status
    FROM vehicle_info
    ORDER BY status, vehicle_no";

const AVAILABLE_VEHICLES: &str = "
    SELECT vehicle_id, vehicle_no, driver_name, status
    FROM vehicle_info
    WHERE status = $1
    ORDER BY vehicle_no";

const INSERT_VEHICLE: &str = "
    INSERT INTO vehicle_info (vehicle_no, driver_name)
    VALUES ($1, $2)";

const COUNT_ORDERS: &str = "SELECT COUNT(*) AS count FROM orders";
const COUNT_PENDING_ORDERS: &str =
    "SELECT COUNT(*) AS count FROM orders WHERE order_status NOT IN ($1, $2)";
const COUNT_DELIVERED_ORDERS: &str = "SELECT COUNT(*) AS count FROM orders WHERE order_status = $1";
const COUNT_CUSTOMERS: &str = "SELECT COUNT(*) AS count FROM customer";
const COUNT_AVAILABLE_VEHICLES: &str = "SELECT get_available_vehicles() AS count";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("rejected by the database: {0}")]
    Rejected(String),

    #[error(transparent)]
    Backend(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e.constraint_violation() {
            Some(message) => Self::Rejected(message.to_string()),
            None => Self::Backend(e),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Domain operations over a [`Backend`]. Holds no state beyond the handle;
/// each call is one query or routine call, except the dashboard.
pub struct TrackingService<B> {
    backend: Arc<B>,
}

impl<B> Clone for TrackingService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> TrackingService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    // Customers

    pub async fn add_customer(&self, customer: &NewCustomer) -> ServiceResult<i32> {
        customer.validate()?;

        let middle_name = customer
            .middle_name
            .clone()
            .filter(|m| !m.trim().is_empty());
        let params: Vec<SqlParam> = vec![
            customer.first_name.as_str().into(),
            middle_name.into(),
            customer.last_name.as_str().into(),
            customer.contact.as_str().into(),
            customer.address.as_str().into(),
        ];

        let row = self.backend.fetch_one(INSERT_CUSTOMER, params).await?;
        let customer_id = returned_id(row, "customer_id")?;
        info!("Customer {} added", customer_id);
        Ok(customer_id)
    }

    pub async fn get_customer_by_contact(&self, contact: &str) -> ServiceResult<Option<Customer>> {
        let sql = format!("SELECT {} FROM customer WHERE contact = $1", CUSTOMER_COLUMNS);
        let row = self.backend.fetch_one(&sql, vec![contact.into()]).await?;
        Ok(row.map(decode).transpose()?)
    }

    pub async fn get_all_customers(&self) -> ServiceResult<Vec<Customer>> {
        let sql = format!(
            "SELECT {} FROM customer ORDER BY created_at DESC, customer_id DESC",
            CUSTOMER_COLUMNS
        );
        self.fetch_all(&sql, vec![]).await
    }

    pub async fn get_customer_orders(&self, customer_id: i32) -> ServiceResult<Vec<CustomerOrder>> {
        let rows = self
            .backend
            .call_procedure(Procedure::GetCustomerOrders, vec![customer_id.into()])
            .await?;
        decode_all(rows)
    }

    // Products

    pub async fn get_all_products(&self) -> ServiceResult<Vec<Product>> {
        self.fetch_all(ALL_PRODUCTS, vec![]).await
    }

    pub async fn add_product(&self, product: &NewProduct) -> ServiceResult<()> {
        product.validate()?;

        let params: Vec<SqlParam> = vec![
            product.product_name.as_str().into(),
            product.category.as_str().into(),
            product.price.into(),
        ];
        self.backend.execute_statement(INSERT_PRODUCT, params).await?;
        info!("Product {} added", product.product_name);
        Ok(())
    }

    // Orders

    /// Places an order for index-aligned `product_ids` and `quantities`.
    /// Order, line items and the first history entry are written by one
    /// database routine.
    pub async fn place_order(
        &self,
        customer_id: i32,
        product_ids: &[i32],
        quantities: &[i32],
        special_instructions: Option<&str>,
    ) -> ServiceResult<i32> {
        let order = NewOrder {
            customer_id,
            product_ids: product_ids.to_vec(),
            quantities: quantities.to_vec(),
            special_instructions: special_instructions.map(str::to_string),
        };
        self.submit_order(&order).await
    }

    pub async fn submit_order(&self, order: &NewOrder) -> ServiceResult<i32> {
        let lines = order.lines()?;
        let (product_ids, quantities): (Vec<i32>, Vec<i32>) = lines
            .iter()
            .map(|line| (line.product_id, line.quantity))
            .unzip();

        let params: Vec<SqlParam> = vec![
            order.customer_id.into(),
            product_ids.into(),
            quantities.into(),
            order.special_instructions.clone().into(),
        ];
        let rows = self
            .backend
            .call_procedure(Procedure::PlaceOrder, params)
            .await?;

        let order_id = returned_id(rows.into_iter().next(), "order_id")?;
        info!(
            "Order {} placed for customer {} with {} line(s)",
            order_id,
            order.customer_id,
            lines.len()
        );
        Ok(order_id)
    }

    /// Succeeds when the payment routine ran; acceptance is the database's call.
    pub async fn process_payment(&self, payment: &PaymentRequest) -> ServiceResult<()> {
        payment.validate()?;

        let params: Vec<SqlParam> = vec![
            payment.order_id.into(),
            payment.amount.into(),
            payment.method.as_str().into(),
        ];
        self.backend
            .call_procedure(Procedure::ProcessPayment, params)
            .await?;
        info!("Payment of {:.2} recorded for order {}", payment.amount, payment.order_id);
        Ok(())
    }

    pub async fn get_order_details(&self, order_id: i32) -> ServiceResult<Option<OrderDetails>> {
        let row = self
            .backend
            .fetch_one(ORDER_DETAILS, vec![order_id.into()])
            .await?;
        Ok(row.map(decode).transpose()?)
    }

    pub async fn get_order_products(&self, order_id: i32) -> ServiceResult<Vec<OrderProduct>> {
        self.fetch_all(ORDER_PRODUCTS, vec![order_id.into()]).await
    }

    /// Newest first.
    pub async fn get_all_orders(&self) -> ServiceResult<Vec<OrderSummary>> {
        self.fetch_all(ALL_ORDERS, vec![]).await
    }

    // Tracking

    pub async fn update_tracking(&self, update: &TrackingUpdate) -> ServiceResult<()> {
        update.validate()?;

        let params: Vec<SqlParam> = vec![
            update.order_id.into(),
            update.location.as_str().into(),
            update.status.as_str().into(),
            update.vehicle_id.into(),
        ];
        self.backend
            .call_procedure(Procedure::UpdateTracking, params)
            .await?;
        info!(
            "Order {} tracked at {} ({})",
            update.order_id, update.location, update.status
        );
        Ok(())
    }

    /// Oldest first, with the assigned vehicle's number and driver when there is one.
    pub async fn get_tracking_history(&self, order_id: i32) -> ServiceResult<Vec<TrackingEvent>> {
        self.fetch_all(TRACKING_HISTORY, vec![order_id.into()]).await
    }

    pub async fn get_order_history(&self, order_id: i32) -> ServiceResult<Vec<OrderHistoryEvent>> {
        self.fetch_all(ORDER_HISTORY, vec![order_id.into()]).await
    }

    // Vehicles

    pub async fn get_all_vehicles(&self) -> ServiceResult<Vec<Vehicle>> {
        self.fetch_all(ALL_VEHICLES, vec![]).await
    }

    pub async fn get_available_vehicles(&self) -> ServiceResult<Vec<Vehicle>> {
        self.fetch_all(AVAILABLE_VEHICLES, vec![status::VEHICLE_AVAILABLE.into()])
            .await
    }

    pub async fn add_vehicle(&self, vehicle: &NewVehicle) -> ServiceResult<()> {
        vehicle.validate()?;

        let params: Vec<SqlParam> = vec![
            vehicle.vehicle_no.as_str().into(),
            vehicle.driver_name.as_str().into(),
        ];
        self.backend.execute_statement(INSERT_VEHICLE, params).await?;
        info!("Vehicle {} added", vehicle.vehicle_no);
        Ok(())
    }

    // Dashboard

    /// Five independent counts. A failing count reads as 0 instead of
    /// failing the whole summary.
    pub async fn get_dashboard_stats(&self) -> DashboardStats {
        DashboardStats {
            total_orders: self.count("total_orders", COUNT_ORDERS, vec![]).await,
            pending_orders: self
                .count(
                    "pending_orders",
                    COUNT_PENDING_ORDERS,
                    vec![status::DELIVERED.into(), status::CANCELLED.into()],
                )
                .await,
            delivered_orders: self
                .count("delivered_orders", COUNT_DELIVERED_ORDERS, vec![status::DELIVERED.into()])
                .await,
            total_customers: self.count("total_customers", COUNT_CUSTOMERS, vec![]).await,
            available_vehicles: self
                .count("available_vehicles", COUNT_AVAILABLE_VEHICLES, vec![])
                .await,
        }
    }

    async fn count(&self, label: &str, sql: &str, params: Vec<SqlParam>) -> i64 {
        match self.backend.fetch_one(sql, params).await {
            Ok(Some(row)) => row.get("count").and_then(Value::as_i64).unwrap_or_else(|| {
                warn!("Dashboard count {} returned no number, reporting 0", label);
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                warn!("Dashboard count {} failed, reporting 0: {}", label, e);
                0
            }
        }
    }

    async fn fetch_all<T: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
        params: Vec<SqlParam>,
    ) -> ServiceResult<Vec<T>> {
        let rows = self.backend.fetch_all(sql, params).await?;
        decode_all(rows)
    }
}

fn decode_all<T: serde::de::DeserializeOwned>(rows: Vec<Record>) -> ServiceResult<Vec<T>> {
    Ok(rows
        .into_iter()
        .map(decode)
        .collect::<Result<Vec<T>, StoreError>>()?)
}

/// Reads a generated id from the row returned by the statement that created it.
fn returned_id(row: Option<Record>, field: &str) -> Result<i32, StoreError> {
    row.as_ref()
        .and_then(|r| r.get(field))
        .and_then(Value::as_i64)
        .and_then(|id| i32::try_from(id).ok())
        .ok_or_else(|| StoreError::Malformed(format!("no {} returned", field)))
}
