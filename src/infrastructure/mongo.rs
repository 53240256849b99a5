use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::options::ReplaceOptions;
use mongodb::{Client, ClientSession, Collection};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::customer::{Customer, CustomerId, CustomerRepository, CustomerStream};
use crate::domain::transaction::Transactional;
use crate::domain::DataAccessError;

pub const COLLECTION_NAME: &str = "customer";

/// MongoDB の `customer` コレクションに保存されるドキュメント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CustomerDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    name: String,
}

impl From<CustomerDocument> for Customer {
    fn from(value: CustomerDocument) -> Self {
        match value.id {
            Some(id) => Customer::with_id(id.to_hex(), value.name),
            None => Customer::new(value.name),
        }
    }
}

impl TryFrom<&Customer> for CustomerDocument {
    type Error = DataAccessError;

    fn try_from(value: &Customer) -> Result<Self, Self::Error> {
        let id = match value.id() {
            Some(id) => Some(
                ObjectId::parse_str(id.as_str())
                    .map_err(|e| DataAccessError::ClientSideError(Box::new(e)))?,
            ),
            None => None,
        };
        Ok(Self {
            id,
            name: value.name().to_owned(),
        })
    }
}

/// ObjectId として解釈できないIDは該当なしとして扱う
fn id_filter(id: &CustomerId) -> Option<Document> {
    ObjectId::parse_str(id.as_str())
        .ok()
        .map(|oid| doc! { "_id": oid })
}

fn inserted(document: CustomerDocument, id: ObjectId) -> Customer {
    Customer::from(CustomerDocument {
        id: Some(id),
        ..document
    })
}

fn upsert_options() -> ReplaceOptions {
    ReplaceOptions::builder().upsert(true).build()
}

fn missing_object_id() -> DataAccessError {
    DataAccessError::WriteError("inserted id is not an ObjectId".into())
}

/// MongoDB を使う顧客ストア
///
/// トランザクションはレプリカセット構成でのみ利用できる。
#[derive(Clone)]
pub struct MongoCustomerStore {
    client: Client,
    collection: Collection<CustomerDocument>,
}

impl MongoCustomerStore {
    pub fn new(client: Client, database: &str) -> Self {
        let collection = client.database(database).collection(COLLECTION_NAME);
        Self { client, collection }
    }

    pub async fn connect(url: &str, database: &str) -> Result<Self, DataAccessError> {
        let client = Client::with_uri_str(url).await?;
        info!("MongoDBに接続しました: {}", database);
        Ok(Self::new(client, database))
    }
}

#[async_trait]
impl CustomerRepository for MongoCustomerStore {
    async fn find_all(&self) -> Result<CustomerStream, DataAccessError> {
        let cursor = self.collection.find(None, None).await?;
        Ok(cursor
            .map_ok(Customer::from)
            .map_err(DataAccessError::from)
            .boxed())
    }

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, DataAccessError> {
        let Some(filter) = id_filter(id) else {
            return Ok(None);
        };
        let document = self.collection.find_one(filter, None).await?;
        Ok(document.map(Customer::from))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Customer>, DataAccessError> {
        let document = self
            .collection
            .find_one(doc! { "name": name }, None)
            .await?;
        Ok(document.map(Customer::from))
    }

    async fn save(&mut self, customer: Customer) -> Result<Customer, DataAccessError> {
        let document = CustomerDocument::try_from(&customer)?;
        let saved = match document.id {
            Some(id) => {
                self.collection
                    .replace_one(doc! { "_id": id }, &document, upsert_options())
                    .await?;
                Customer::from(document)
            }
            None => {
                let result = self.collection.insert_one(&document, None).await?;
                let id = result.inserted_id.as_object_id().ok_or_else(missing_object_id)?;
                inserted(document, id)
            }
        };
        debug!("顧客を保存しました: {:?}", saved);
        Ok(saved)
    }
}

/// セッションに紐づいた MongoDB のトランザクション
pub struct MongoTransaction {
    session: Mutex<ClientSession>,
    collection: Collection<CustomerDocument>,
}

#[async_trait]
impl CustomerRepository for MongoTransaction {
    async fn find_all(&self) -> Result<CustomerStream, DataAccessError> {
        let mut session = self.session.lock().await;
        let mut cursor = self
            .collection
            .find_with_session(None, None, &mut *session)
            .await?;
        let documents: Vec<CustomerDocument> = cursor.stream(&mut *session).try_collect().await?;
        Ok(stream::iter(documents.into_iter().map(Customer::from).map(Ok)).boxed())
    }

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, DataAccessError> {
        let Some(filter) = id_filter(id) else {
            return Ok(None);
        };
        let mut session = self.session.lock().await;
        let document = self
            .collection
            .find_one_with_session(filter, None, &mut *session)
            .await?;
        Ok(document.map(Customer::from))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Customer>, DataAccessError> {
        let mut session = self.session.lock().await;
        let document = self
            .collection
            .find_one_with_session(doc! { "name": name }, None, &mut *session)
            .await?;
        Ok(document.map(Customer::from))
    }

    async fn save(&mut self, customer: Customer) -> Result<Customer, DataAccessError> {
        let document = CustomerDocument::try_from(&customer)?;
        let session = self.session.get_mut();
        match document.id {
            Some(id) => {
                self.collection
                    .replace_one_with_session(
                        doc! { "_id": id },
                        &document,
                        upsert_options(),
                        session,
                    )
                    .await?;
                Ok(Customer::from(document))
            }
            None => {
                let result = self
                    .collection
                    .insert_one_with_session(&document, None, session)
                    .await?;
                let id = result.inserted_id.as_object_id().ok_or_else(missing_object_id)?;
                Ok(inserted(document, id))
            }
        }
    }
}

#[async_trait]
impl Transactional for MongoCustomerStore {
    type Transaction = MongoTransaction;

    async fn begin(&self) -> Result<Self::Transaction, DataAccessError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        Ok(MongoTransaction {
            session: Mutex::new(session),
            collection: self.collection.clone(),
        })
    }

    async fn commit(&self, tx: Self::Transaction) -> Result<(), DataAccessError> {
        tx.session.into_inner().commit_transaction().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Transaction) -> Result<(), DataAccessError> {
        tx.session.into_inner().abort_transaction().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson;

    use crate::domain::customer::CustomerService;

    use super::*;

    #[test]
    fn test_document_from_customer() {
        let document = CustomerDocument::try_from(&Customer::new("Martin")).unwrap();
        assert_eq!(
            bson::to_document(&document).unwrap(),
            doc! { "name": "Martin" }
        );

        let id = ObjectId::new();
        let document =
            CustomerDocument::try_from(&Customer::with_id(id.to_hex(), "Sara")).unwrap();
        assert_eq!(
            bson::to_document(&document).unwrap(),
            doc! { "_id": id, "name": "Sara" }
        );
        assert_eq!(
            Customer::from(document),
            Customer::with_id(id.to_hex(), "Sara")
        );
    }

    #[test]
    fn test_document_from_invalid_id() {
        let result = CustomerDocument::try_from(&Customer::with_id("foo", "Foo"));
        assert!(matches!(result, Err(DataAccessError::ClientSideError(_))));
        assert_eq!(id_filter(&"foo".into()), None);
    }

    #[tokio::test]
    #[ignore = "localhost:27017 のレプリカセットが必要"]
    async fn test_repository() {
        // リポジトリ作成
        let database = format!("kokyaku_test_{}", ObjectId::new().to_hex());
        let mut repo =
            MongoCustomerStore::connect("mongodb://localhost:27017/?replicaSet=rs0", &database)
                .await
                .unwrap();

        // 登録確認
        let saved = repo.save(Customer::new("Martin")).await.unwrap();
        let id = saved.id().cloned().unwrap();
        assert_eq!(repo.find_by_id(&id).await.unwrap(), Some(saved.clone()));
        assert_eq!(repo.find_by_name("Martin").await.unwrap(), Some(saved));
        assert_eq!(repo.find_by_id(&"foo".into()).await.unwrap(), None);

        // 一括登録のロールバック確認
        let service = CustomerService::new(repo.clone());
        assert!(service.save(["Sara", "ia"]).await.is_err());
        let all: Vec<Customer> = repo.find_all().await.unwrap().try_collect().await.unwrap();
        assert_eq!(all.len(), 1);

        repo.client.database(&database).drop(None).await.unwrap();
    }
}
