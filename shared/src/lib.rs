pub mod validation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use validation::ValidationError;
use validation::{require_amount, require_id, require_text};

/// Order status values the database writes and the dashboard counts on.
pub mod status {
    pub const PLACED: &str = "Placed";
    pub const DISPATCHED: &str = "Dispatched";
    pub const IN_TRANSIT: &str = "In Transit";
    pub const DELIVERED: &str = "Delivered";
    pub const CANCELLED: &str = "Cancelled";

    pub const VEHICLE_AVAILABLE: &str = "Available";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: i32,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub contact: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCustomer {
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    pub contact: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: i32,
    pub product_name: String,
    pub category: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub product_name: String,
    pub category: String,
    pub price: f64,
}

/// Row of the "all orders" listing, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: i32,
    pub customer_name: String,
    pub order_status: String,
    pub expected_delivery: DateTime<Utc>,
    pub has_paid: bool,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
}

/// Order joined with its customer plus the totals, location and delay
/// flag computed by database functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order_id: i32,
    pub order_status: String,
    pub expected_delivery: DateTime<Utc>,
    pub has_paid: bool,
    pub spl_instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub first_name: String,
    pub last_name: String,
    pub contact: String,
    pub address: String,
    pub total_amount: f64,
    pub current_location: Option<String>,
    pub is_delayed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderProduct {
    pub product_name: String,
    pub category: String,
    pub price: f64,
    pub quantity: i32,
    pub subtotal: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerOrder {
    pub order_id: i32,
    pub order_status: String,
    pub expected_delivery: DateTime<Utc>,
    pub has_paid: bool,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub location: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub vehicle_no: Option<String>,
    pub driver_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHistoryEvent {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub vehicle_id: i32,
    pub vehicle_no: String,
    pub driver_name: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVehicle {
    pub vehicle_no: String,
    pub driver_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: i32,
    pub product_ids: Vec<i32>,
    pub quantities: Vec<i32>,
    #[serde(default)]
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub order_id: i32,
    pub amount: f64,
    pub method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub order_id: i32,
    pub location: String,
    pub status: String,
    #[serde(default)]
    pub vehicle_id: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_orders: i64,
    pub pending_orders: i64,
    pub delivered_orders: i64,
    pub total_customers: i64,
    pub available_vehicles: i64,
}

impl NewCustomer {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("first_name", &self.first_name, 50)?;
        if let Some(middle) = self.middle_name.as_deref().filter(|m| !m.trim().is_empty()) {
            require_text("middle_name", middle, 50)?;
        }
        require_text("last_name", &self.last_name, 50)?;
        require_text("contact", &self.contact, 20)?;
        require_text("address", &self.address, 255)?;
        Ok(())
    }
}

impl NewProduct {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("product_name", &self.product_name, 100)?;
        require_text("category", &self.category, 50)?;
        require_amount("price", self.price)?;
        Ok(())
    }
}

impl NewVehicle {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("vehicle_no", &self.vehicle_no, 20)?;
        require_text("driver_name", &self.driver_name, 100)?;
        Ok(())
    }
}

impl OrderLine {
    /// Pairs index-aligned product ids and quantities into order lines.
    pub fn pair(product_ids: &[i32], quantities: &[i32]) -> Result<Vec<Self>, ValidationError> {
        if product_ids.len() != quantities.len() {
            return Err(ValidationError::LengthMismatch {
                left: "product_ids",
                right: "quantities",
                left_len: product_ids.len(),
                right_len: quantities.len(),
            });
        }
        if product_ids.is_empty() {
            return Err(ValidationError::Empty { field: "product_ids" });
        }

        product_ids
            .iter()
            .zip(quantities)
            .map(|(&product_id, &quantity)| {
                require_id("product_id", product_id)?;
                if quantity <= 0 {
                    return Err(ValidationError::NotPositive { field: "quantity" });
                }
                Ok(Self { product_id, quantity })
            })
            .collect()
    }
}

impl NewOrder {
    pub fn lines(&self) -> Result<Vec<OrderLine>, ValidationError> {
        require_id("customer_id", self.customer_id)?;
        if let Some(instructions) = &self.special_instructions {
            if instructions.chars().count() > 500 {
                return Err(ValidationError::TooLong {
                    field: "special_instructions",
                    max: 500,
                });
            }
        }
        OrderLine::pair(&self.product_ids, &self.quantities)
    }
}

impl PaymentRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_id("order_id", self.order_id)?;
        require_amount("amount", self.amount)?;
        if self.amount == 0.0 {
            return Err(ValidationError::NotPositive { field: "amount" });
        }
        require_text("method", &self.method, 30)?;
        Ok(())
    }
}

impl TrackingUpdate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_id("order_id", self.order_id)?;
        require_text("location", &self.location, 100)?;
        require_text("status", &self.status, 30)?;
        if let Some(vehicle_id) = self.vehicle_id {
            require_id("vehicle_id", vehicle_id)?;
        }
        Ok(())
    }
}
