use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use snowflake::SnowflakeIdGenerator;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::domain::customer::{Customer, CustomerId, CustomerRepository, CustomerStream};
use crate::domain::transaction::Transactional;
use crate::domain::DataAccessError;

/// プロセス内に顧客ドキュメントを保持するストア
///
/// IDはスノーフレークで採番し、10進文字列として扱う。
/// クローンは同じドキュメント群を共有する。
#[derive(Clone)]
pub struct MemoryCustomerStore {
    inner: Arc<Inner>,
}

struct Inner {
    documents: RwLock<Vec<Customer>>,
    ids: Mutex<SnowflakeIdGenerator>,
}

impl MemoryCustomerStore {
    pub fn new() -> Self {
        Self::with_generator(SnowflakeIdGenerator::new(1, 1))
    }

    pub fn with_generator(gen: SnowflakeIdGenerator) -> Self {
        Self {
            inner: Arc::new(Inner {
                documents: RwLock::new(Vec::new()),
                ids: Mutex::new(gen),
            }),
        }
    }

    async fn assign_id(&self, customer: Customer) -> Customer {
        if customer.id().is_some() {
            return customer;
        }
        let id = self.inner.ids.lock().await.generate();
        Customer::with_id(id.to_string(), customer.name())
    }

    async fn snapshot(&self) -> Vec<Customer> {
        self.inner.documents.read().await.clone()
    }
}

impl Default for MemoryCustomerStore {
    fn default() -> Self {
        Self::new()
    }
}

fn upsert(documents: &mut Vec<Customer>, customer: Customer) {
    match documents.iter_mut().find(|c| c.id() == customer.id()) {
        Some(existing) => *existing = customer,
        None => documents.push(customer),
    }
}

fn into_stream(documents: Vec<Customer>) -> CustomerStream {
    stream::iter(documents.into_iter().map(Ok)).boxed()
}

#[async_trait]
impl CustomerRepository for MemoryCustomerStore {
    async fn find_all(&self) -> Result<CustomerStream, DataAccessError> {
        Ok(into_stream(self.snapshot().await))
    }

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, DataAccessError> {
        let documents = self.inner.documents.read().await;
        Ok(documents.iter().find(|c| c.id() == Some(id)).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Customer>, DataAccessError> {
        let documents = self.inner.documents.read().await;
        Ok(documents.iter().find(|c| c.name() == name).cloned())
    }

    async fn save(&mut self, customer: Customer) -> Result<Customer, DataAccessError> {
        let customer = self.assign_id(customer).await;
        upsert(&mut *self.inner.documents.write().await, customer.clone());
        debug!("顧客を保存しました: {:?}", customer);
        Ok(customer)
    }
}

/// [`MemoryCustomerStore`] のトランザクション
///
/// 書き込みはコミットまで `staged` に溜め、ストアには反映しない。
/// 読み込みはコミット済みのドキュメントに自分の書き込みを重ねて返す。
pub struct MemoryTransaction {
    store: MemoryCustomerStore,
    staged: Vec<Customer>,
}

impl MemoryTransaction {
    async fn view(&self) -> Vec<Customer> {
        let mut documents = self.store.snapshot().await;
        for customer in &self.staged {
            upsert(&mut documents, customer.clone());
        }
        documents
    }
}

#[async_trait]
impl CustomerRepository for MemoryTransaction {
    async fn find_all(&self) -> Result<CustomerStream, DataAccessError> {
        Ok(into_stream(self.view().await))
    }

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, DataAccessError> {
        Ok(self.view().await.into_iter().find(|c| c.id() == Some(id)))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Customer>, DataAccessError> {
        Ok(self.view().await.into_iter().find(|c| c.name() == name))
    }

    async fn save(&mut self, customer: Customer) -> Result<Customer, DataAccessError> {
        let customer = self.store.assign_id(customer).await;
        upsert(&mut self.staged, customer.clone());
        Ok(customer)
    }
}

#[async_trait]
impl Transactional for MemoryCustomerStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Transaction, DataAccessError> {
        Ok(MemoryTransaction {
            store: self.clone(),
            staged: Vec::new(),
        })
    }

    async fn commit(&self, tx: Self::Transaction) -> Result<(), DataAccessError> {
        let mut documents = self.inner.documents.write().await;
        debug!("{}件の書き込みをコミットします", tx.staged.len());
        for customer in tx.staged {
            upsert(&mut documents, customer);
        }
        Ok(())
    }

    async fn rollback(&self, tx: Self::Transaction) -> Result<(), DataAccessError> {
        debug!("{}件の書き込みを破棄します", tx.staged.len());
        Ok(())
    }
}
