use axum::{
    extract::{Path, Query, State},
    http::{
        header::{HOST, LOCATION},
        HeaderMap, StatusCode,
    },
    handler::Handler,
    response::{IntoResponse, Response},
    routing::{on, MethodFilter, MethodRouter},
    Json, Router,
};
use futures::TryStreamExt;
use kokyaku::domain::{
    customer::{Customer, CustomerId, CustomerRepository, CustomerService},
    transaction::Transactional,
};
use serde::Deserialize;
use tracing::debug;

use crate::error::AppError;

/// ハンドラが共有する状態
#[derive(Clone)]
pub struct AppState<S> {
    store: S,
    service: CustomerService<S>,
    public_host: String,
}

impl<S> AppState<S>
where
    S: Transactional + Clone,
    S::Transaction: CustomerRepository,
{
    pub fn new(store: S, public_host: impl Into<String>) -> Self {
        Self {
            service: CustomerService::new(store.clone()),
            store,
            public_host: public_host.into(),
        }
    }
}

type Route<S> = (MethodFilter, &'static str, MethodRouter<AppState<S>>);

/// メソッドとパスに対するハンドラをルート定義にする
fn route<H, T, S>(method: MethodFilter, path: &'static str, handler: H) -> Route<S>
where
    H: Handler<T, AppState<S>>,
    T: 'static,
    AppState<S>: Clone + Send + Sync + 'static,
{
    (method, path, on(method, handler))
}

/// ルート定義 (上から順に照合する)
fn route_table<S>() -> Vec<Route<S>>
where
    S: CustomerRepository + Transactional + Clone + 'static,
    S::Transaction: CustomerRepository,
{
    vec![
        route(MethodFilter::GET, "/customers", all_customers::<S>),
        route(MethodFilter::GET, "/customers/by-name/:name", customer_by_name::<S>),
        route(MethodFilter::GET, "/customers/:id", customer_by_id::<S>),
        route(MethodFilter::POST, "/customers", create_customer::<S>),
        route(MethodFilter::GET, "/load", load::<S>),
    ]
}

/// ルート定義から axum のルーターを組み立てる
///
/// 同じパスに複数のメソッドがあればひとつのメソッドルーターにまとめる。
pub fn router<S>(state: AppState<S>) -> Router
where
    S: CustomerRepository + Transactional + Clone + 'static,
    S::Transaction: CustomerRepository,
{
    let mut paths: Vec<(&'static str, MethodRouter<AppState<S>>)> = Vec::new();
    for (method, path, handler) in route_table::<S>() {
        debug!("ルート登録: {:?} {}", method, path);
        match paths.iter().position(|(p, _)| *p == path) {
            Some(i) => {
                let (p, existing) = paths.remove(i);
                paths.insert(i, (p, existing.merge(handler)));
            }
            None => paths.push((path, handler)),
        }
    }
    paths
        .into_iter()
        .fold(Router::new(), |router, (path, handler)| {
            router.route(path, handler)
        })
        .with_state(state)
}

async fn collect_all<S: CustomerRepository>(store: &S) -> Result<Vec<Customer>, AppError> {
    Ok(store.find_all().await?.try_collect().await?)
}

fn found(customer: Option<Customer>) -> Response {
    match customer {
        Some(customer) => (StatusCode::OK, Json(customer)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn all_customers<S>(State(state): State<AppState<S>>) -> Result<Json<Vec<Customer>>, AppError>
where
    S: CustomerRepository,
{
    Ok(Json(collect_all(&state.store).await?))
}

async fn customer_by_name<S>(
    State(state): State<AppState<S>>,
    Path(name): Path<String>,
) -> Result<Response, AppError>
where
    S: CustomerRepository,
{
    Ok(found(state.store.find_by_name(&name).await?))
}

async fn customer_by_id<S>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Response, AppError>
where
    S: CustomerRepository,
{
    Ok(found(state.store.find_by_id(&CustomerId::from(id)).await?))
}

/// 本文をそのまま名前として顧客を作成する
///
/// 名前の大文字チェックは行わない。
async fn create_customer<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    name: String,
) -> Result<Response, AppError>
where
    S: CustomerRepository + Clone,
{
    if name.is_empty() {
        return Err(AppError::bad_request("Customer name is required"));
    }
    let mut store = state.store.clone();
    let customer = store.save(Customer::new(name)).await?;
    let id = customer
        .id()
        .ok_or_else(|| AppError::internal("Saved customer has no id"))?;
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(&state.public_host);
    let location = format!("http://{}/customers/{}", host, id);
    Ok((StatusCode::CREATED, [(LOCATION, location)], Json(customer)).into_response())
}

/// カンマ区切りの名前を分割する
///
/// 末尾の空要素だけを捨て、先頭や途中の空要素は残す。
/// 区切りが無ければ入力をそのまま一要素として返す。
fn split_names(names: &str) -> Vec<&str> {
    let mut parts = names.split(',').collect::<Vec<_>>();
    if parts.len() > 1 {
        while parts.last() == Some(&"") {
            parts.pop();
        }
    }
    parts
}

#[derive(Debug, Deserialize)]
struct LoadParams {
    names: Option<String>,
}

/// `names` があれば一括登録してから、全顧客を返す
async fn load<S>(
    State(state): State<AppState<S>>,
    Query(params): Query<LoadParams>,
) -> Result<Json<Vec<Customer>>, AppError>
where
    S: CustomerRepository + Transactional,
    S::Transaction: CustomerRepository,
{
    if let Some(names) = params.names {
        state.service.save(split_names(&names)).await?;
    }
    Ok(Json(collect_all(&state.store).await?))
}

#[cfg(test)]
mod tests {
    use kokyaku::infrastructure::memory::MemoryCustomerStore;

    use super::*;

    #[test]
    fn test_route_table() {
        let routes = route_table::<MemoryCustomerStore>()
            .into_iter()
            .map(|(method, path, _)| (method, path))
            .collect::<Vec<_>>();
        assert_eq!(
            routes,
            vec![
                (MethodFilter::GET, "/customers"),
                (MethodFilter::GET, "/customers/by-name/:name"),
                (MethodFilter::GET, "/customers/:id"),
                (MethodFilter::POST, "/customers"),
                (MethodFilter::GET, "/load"),
            ]
        );
    }

    #[test]
    fn test_split_names() {
        assert_eq!(split_names("Martin,Sara"), vec!["Martin", "Sara"]);
        assert_eq!(split_names("Martin,Sara,"), vec!["Martin", "Sara"]);
        assert_eq!(split_names("Martin,Sara,,,"), vec!["Martin", "Sara"]);
        assert_eq!(split_names("a,,b"), vec!["a", "", "b"]);
        assert_eq!(split_names(",a"), vec!["", "a"]);
        assert_eq!(split_names(""), vec![""]);
        assert!(split_names(",,").is_empty());
    }
}
