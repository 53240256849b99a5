use async_trait::async_trait;
use derive_more::{Deref, Display, Error, From};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tracing::{info, warn};

use crate::domain::transaction::{transactional, Transactional};
use crate::domain::DataAccessError;

/// 顧客の一覧を遅延で返すストリーム
pub type CustomerStream = BoxStream<'static, Result<Customer, DataAccessError>>;

/// 顧客リポジトリ
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// 保存されている顧客を全て取得する (順序はストア依存)
    async fn find_all(&self) -> Result<CustomerStream, DataAccessError>;
    /// IDから顧客を取得する
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, DataAccessError>;
    /// 名前が完全一致する顧客を取得する
    async fn find_by_name(&self, name: &str) -> Result<Option<Customer>, DataAccessError>;
    /// 顧客を保存し、IDが振られた顧客を返す
    ///
    /// IDが無ければ新規作成、あればそのIDのドキュメントを上書きする。
    async fn save(&mut self, customer: Customer) -> Result<Customer, DataAccessError>;
}

/// 顧客ID
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref)]
#[serde(transparent)]
pub struct CustomerId(String);

impl From<&str> for CustomerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// 顧客エンティティ
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: Option<CustomerId>,
    name: String,
}

impl Customer {
    /// 未保存の顧客を作る
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// 保存済みの顧客を作る
    pub fn with_id(id: impl Into<CustomerId>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
        }
    }

    pub fn id(&self) -> Option<&CustomerId> {
        self.id.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validate(&self) -> Result<(), CustomerError> {
        match self.name.chars().next() {
            Some(c) if c.is_uppercase() => Ok(()),
            _ => Err(CustomerError::FirstCharNotUppercase),
        }
    }
}

/// 顧客エラー
#[derive(Error, Display, Debug, PartialEq, Eq)]
pub enum CustomerError {
    /// 名前の先頭が大文字ではありません
    #[display(fmt = "First char should be caps")]
    FirstCharNotUppercase,
}

#[derive(ThisError, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] CustomerError),
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
}

/// 顧客の一括登録サービス
#[derive(Clone)]
pub struct CustomerService<S> {
    store: S,
}

impl<S> CustomerService<S>
where
    S: Transactional,
    S::Transaction: CustomerRepository,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// 名前ごとに顧客を保存し、保存後に名前を検証する
    ///
    /// 全件がひとつのトランザクションで実行され、どれかの検証に失敗すると
    /// それまでの保存も含めて全てロールバックされる。
    pub async fn save<I>(&self, names: I) -> Result<Vec<Customer>, ServiceError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect::<Vec<String>>();
        let count = names.len();
        let result = transactional::<_, _, _, ServiceError>(&self.store, move |tx| {
            Box::pin(async move {
                let mut saved = Vec::with_capacity(names.len());
                for name in names {
                    let customer = tx.save(Customer::new(name)).await?;
                    customer.validate()?;
                    saved.push(customer);
                }
                Ok(saved)
            })
        })
        .await;
        match &result {
            Ok(_) => info!("顧客を{}件登録しました", count),
            Err(e) => warn!("顧客の一括登録を取り消しました: {}", e),
        }
        result
    }
}
