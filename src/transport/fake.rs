//! In-memory server used by the unit tests

use crate::catalog::filter::FilterQuery;
use crate::catalog::models::{Product, ProductDraft};
use crate::core::error::{CatalogError, Result};
use crate::session::models::{Credentials, Registration, RegistrationReceipt, Session};
use crate::transport::{Ack, AuthTransport, ProductTransport};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct FakeServer {
    products: Mutex<Vec<Product>>,
    users: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, String>>,
    list_delays: Mutex<VecDeque<Duration>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: Vec<Product>) -> Self {
        let server = Self::new();
        server.next_id.store(products.len() as u64, Ordering::SeqCst);
        *server.products.lock().unwrap() = products;
        server
    }

    pub fn with_user(self, username: &str, email: &str, password: &str) -> Self {
        self.users
            .lock()
            .unwrap()
            .push(Registration::new(username, email, password));
        self
    }

    /// The next call to `op` fails with a remote error carrying `message`
    pub fn fail_next(&self, op: &'static str, message: &str) {
        self.failures.lock().unwrap().insert(op, message.to_string());
    }

    /// Delay the next list response. The snapshot is taken before sleeping.
    pub fn delay_next_list(&self, delay: Duration) {
        self.list_delays.lock().unwrap().push_back(delay);
    }

    pub fn calls(&self, op: &'static str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Simulate a change made by another client
    pub fn insert(&self, product: Product) {
        self.products.lock().unwrap().push(product);
    }

    pub fn products(&self) -> Vec<Product> {
        self.products.lock().unwrap().clone()
    }

    fn record(&self, op: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        match self.failures.lock().unwrap().remove(op) {
            Some(message) => Err(CatalogError::Remote(message)),
            None => Ok(()),
        }
    }

    async fn respond_list(&self, snapshot: Vec<Product>) -> Vec<Product> {
        let delay = self.list_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        snapshot
    }
}

pub(crate) fn product(id: &str, name: &str, price: &str, stock: u32) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
        price: price.parse::<Decimal>().unwrap(),
        stock,
        images: Vec::new(),
        created_at: None,
    }
}

pub(crate) fn numbered_products(count: usize) -> Vec<Product> {
    (0..count)
        .map(|i| product(&format!("p{}", i), &format!("Item {}", i), "1.00", i as u32))
        .collect()
}

fn matches(product: &Product, query: &FilterQuery) -> bool {
    let name_ok = query.name.as_ref().map_or(true, |name| {
        product.name.to_lowercase().contains(&name.to_lowercase())
    });
    let date_ok = query.created_date.map_or(true, |date| {
        product.created_at.map(|at| at.date_naive()) == Some(date)
    });
    let stock_ok = query.stock.map_or(true, |stock| product.stock >= stock);
    name_ok && date_ok && stock_ok
}

#[async_trait]
impl ProductTransport for FakeServer {
    async fn list_all(&self) -> Result<Vec<Product>> {
        self.record("list_all")?;
        let snapshot = self.products();
        Ok(self.respond_list(snapshot).await)
    }

    async fn list_filtered(&self, query: &FilterQuery) -> Result<Vec<Product>> {
        self.record("list_filtered")?;
        let snapshot: Vec<Product> = self
            .products()
            .into_iter()
            .filter(|p| matches(p, query))
            .collect();
        Ok(self.respond_list(snapshot).await)
    }

    async fn create(&self, draft: &ProductDraft) -> Result<Product> {
        self.record("create")?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let product = Product {
            id: format!("p{}", id),
            name: draft.name.clone(),
            description: draft.description.clone(),
            price: draft.price,
            stock: draft.stock,
            images: draft.images.clone(),
            created_at: Some(Utc::now()),
        };
        self.products.lock().unwrap().push(product.clone());
        Ok(product)
    }

    async fn update(&self, id: &str, draft: &ProductDraft) -> Result<Product> {
        self.record("update")?;
        let mut products = self.products.lock().unwrap();
        let product = products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CatalogError::Remote("Product not found".to_string()))?;
        product.name = draft.name.clone();
        product.description = draft.description.clone();
        product.price = draft.price;
        product.stock = draft.stock;
        product.images = draft.images.clone();
        Ok(product.clone())
    }

    async fn delete(&self, id: &str) -> Result<Ack> {
        self.record("delete")?;
        let mut products = self.products.lock().unwrap();
        let before = products.len();
        products.retain(|p| p.id != id);
        if products.len() == before {
            return Err(CatalogError::Remote("Product not found".to_string()));
        }
        Ok(Ack {
            message: Some("Product deleted".to_string()),
        })
    }
}

#[async_trait]
impl AuthTransport for FakeServer {
    async fn login(&self, credentials: &Credentials) -> Result<Session> {
        self.record("login")?;
        let users = self.users.lock().unwrap();
        users
            .iter()
            .find(|u| u.email == credentials.email && u.password == credentials.password)
            .map(|u| Session::new(&u.username, &u.email, format!("token-{}", u.username)))
            .ok_or_else(|| CatalogError::Remote("Invalid credentials".to_string()))
    }

    async fn register(&self, registration: &Registration) -> Result<RegistrationReceipt> {
        self.record("register")?;
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == registration.email) {
            return Err(CatalogError::Remote("User already exists".to_string()));
        }
        users.push(registration.clone());
        Ok(RegistrationReceipt {
            message: "Registration successful!".to_string(),
        })
    }
}
