use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::domain::DataAccessError;

/// トランザクションを開始・確定・破棄できるストア
#[async_trait]
pub trait Transactional: Send + Sync {
    /// トランザクション中の操作に使うハンドル
    type Transaction: Send;

    /// トランザクションを開始する
    async fn begin(&self) -> Result<Self::Transaction, DataAccessError>;
    /// トランザクション中の書き込みを確定する
    async fn commit(&self, tx: Self::Transaction) -> Result<(), DataAccessError>;
    /// トランザクション中の書き込みを破棄する
    async fn rollback(&self, tx: Self::Transaction) -> Result<(), DataAccessError>;
}

/// `work` をひとつのトランザクション内で実行する
///
/// `work` が `Ok` を返せばコミットし、`Err` を返せばロールバックしてそのエラーを返す。
/// ロールバック自体の失敗はログに残し、`work` のエラーを優先する。
pub async fn transactional<S, F, T, E>(store: &S, work: F) -> Result<T, E>
where
    S: Transactional,
    F: for<'t> FnOnce(&'t mut S::Transaction) -> BoxFuture<'t, Result<T, E>> + Send,
    T: Send,
    E: From<DataAccessError> + Send,
{
    let mut tx = store.begin().await?;
    match work(&mut tx).await {
        Ok(value) => {
            store.commit(tx).await?;
            debug!("トランザクションをコミットしました");
            Ok(value)
        }
        Err(error) => {
            if let Err(e) = store.rollback(tx).await {
                warn!("ロールバックに失敗しました: {}", e);
            } else {
                debug!("トランザクションをロールバックしました");
            }
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use crate::domain::customer::{Customer, CustomerRepository};
    use crate::infrastructure::memory::MemoryCustomerStore;

    use super::*;

    #[tokio::test]
    async fn test_commit_on_ok() {
        let store = MemoryCustomerStore::new();
        let saved = transactional::<_, _, _, DataAccessError>(&store, |tx| {
            Box::pin(async move { tx.save(Customer::new("Martin")).await })
        })
        .await
        .unwrap();

        let id = saved.id().cloned().unwrap();
        assert_eq!(store.find_by_id(&id).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_rollback_on_err() {
        let store = MemoryCustomerStore::new();
        let result = transactional::<_, _, (), DataAccessError>(&store, |tx| {
            Box::pin(async move {
                tx.save(Customer::new("Sara")).await?;
                Err(DataAccessError::WriteError("中断".into()))
            })
        })
        .await;

        assert!(matches!(result, Err(DataAccessError::WriteError(_))));
        let all: Vec<Customer> = store.find_all().await.unwrap().try_collect().await.unwrap();
        assert!(all.is_empty());
    }
}
