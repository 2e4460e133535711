//! Generic repository over one logical table of a datasource.
//!
//! Reads go through [`ReplicaSet::pick_read`], writes and transactions through
//! the master. The physical table is the datasource prefix plus
//! [`EntitySchema::TABLE`].

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use modkit_query::{
    FilterRegistry, Page, Predicate, PredicateKind, Query as ListQuery, Scalar, describe,
};
use sea_orm::sea_query::{Alias, Expr, Query, SimpleExpr};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseTransaction, FromQueryResult, Statement, Value,
};

use crate::error::{DatasourceError, ExecError, Result};
use crate::handle::{DbHandle, bounded};
use crate::router::ReplicaSet;
use crate::statement::{COUNT_ALIAS, count_statement, predicate_expr, select_statement};

/// Future returned by a [`Repository::transaction`] body.
pub type TxFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

/// Row type bound to a logical table.
///
/// ```ignore
/// #[derive(FromQueryResult)]
/// struct User { id: i64, email: String }
///
/// impl EntitySchema for User {
///     const TABLE: &'static str = "user";
///     const COLUMNS: &'static [&'static str] = &["id", "email"];
///
///     fn values(&self) -> Vec<(&'static str, Value)> {
///         vec![("id", self.id.into()), ("email", self.email.clone().into())]
///     }
/// }
/// ```
pub trait EntitySchema: FromQueryResult + Send + Sync + 'static {
    /// Unprefixed table name.
    const TABLE: &'static str;
    /// Columns selected by reads.
    const COLUMNS: &'static [&'static str];
    const PRIMARY_KEY: &'static str = "id";

    /// Column values written by inserts and updates.
    ///
    /// Leave the primary key out to let the database assign it on insert.
    fn values(&self) -> Vec<(&'static str, Value)>;
}

/// Result of [`Repository::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub rows_affected: u64,
    /// Generated key, when the engine reports one.
    pub last_insert_id: Option<i64>,
}

pub struct Repository<E> {
    replicas: ReplicaSet,
    filters: Arc<FilterRegistry>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            replicas: self.replicas.clone(),
            filters: Arc::clone(&self.filters),
            _entity: PhantomData,
        }
    }
}

fn pk_eq<E: EntitySchema>(id: Value) -> SimpleExpr {
    Expr::col(Alias::new(E::PRIMARY_KEY)).eq(id)
}

/// `pk IN (ids)`; an empty id list matches nothing.
fn pk_in<E: EntitySchema>(ids: Vec<Scalar>) -> SimpleExpr {
    let kind = if ids.is_empty() {
        PredicateKind::Never
    } else {
        PredicateKind::In(ids)
    };
    predicate_expr(&Predicate {
        column: E::PRIMARY_KEY.to_owned(),
        kind,
    })
}

/// Commit on success, roll back otherwise.
async fn settle<T>(handle: &DbHandle, txn: DatabaseTransaction, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = txn.rollback().await {
                tracing::warn!(
                    datasource = handle.datasource_id(),
                    error = %rollback,
                    "Transaction rollback failed"
                );
            }
            Err(err)
        }
    }
}

async fn fetch_count<C: ConnectionTrait>(conn: &C, stmt: Statement) -> Result<u64> {
    let total = match conn.query_one(stmt).await? {
        Some(row) => row.try_get::<i64>("", COUNT_ALIAS)?,
        None => 0,
    };
    Ok(u64::try_from(total).unwrap_or(0))
}

impl<E: EntitySchema> Repository<E> {
    #[must_use]
    pub fn new(master: DbHandle, filters: FilterRegistry) -> Self {
        Self::with_replicas(ReplicaSet::single(master), filters)
    }

    #[must_use]
    pub fn with_replicas(replicas: ReplicaSet, filters: FilterRegistry) -> Self {
        Self {
            replicas,
            filters: Arc::new(filters),
            _entity: PhantomData,
        }
    }

    /// Handle used for writes.
    #[must_use]
    pub fn master(&self) -> &DbHandle {
        self.replicas.pick_write()
    }

    /// Handle for one read; a fresh pick on every call.
    #[must_use]
    pub fn slave(&self) -> &DbHandle {
        self.replicas.pick_read()
    }

    #[must_use]
    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Physical table name on the master.
    #[must_use]
    pub fn table_name(&self) -> String {
        self.master().table_name(E::TABLE)
    }

    /// Filtered, sorted and paged list read from a replica.
    ///
    /// # Errors
    /// - [`DatasourceError::Query`] if the request does not fit the filter registry
    /// - [`DatasourceError::QueryExecutionFailed`] on storage failure or `queryTimeout`
    pub async fn query(&self, query: &ListQuery) -> Result<Page<E>> {
        self.query_on(self.slave(), query).await
    }

    /// [`Repository::query`] against a specific handle.
    ///
    /// # Errors
    /// See [`Repository::query`].
    pub async fn query_on(&self, handle: &DbHandle, query: &ListQuery) -> Result<Page<E>> {
        let t = self.filters.translate(query)?;
        let table = handle.table_name(E::TABLE);
        let conn = handle.conn();
        let backend = conn.get_database_backend();
        let select = backend.build(&select_statement(&table, E::COLUMNS, &t));
        let count = backend.build(&count_statement(&table, &t));

        tracing::debug!(
            datasource = handle.datasource_id(),
            table,
            clause = %t,
            "Executing list query"
        );

        let (list, total) = bounded(handle.timeouts().query, "query", async {
            let list = E::find_by_statement(select).all(conn).await?;
            let total = fetch_count(conn, count).await?;
            Ok::<_, DatasourceError>((list, total))
        })
        .await?;

        Ok(Page::new(describe(query.page, query.page_size, total)?, list))
    }

    /// Number of rows matching the filters of `query` on a replica.
    ///
    /// Paging of `query` is ignored; sort keys are still checked against the registry.
    ///
    /// # Errors
    /// See [`Repository::query`].
    pub async fn count(&self, query: &ListQuery) -> Result<u64> {
        let unpaged = ListQuery {
            page: 1,
            page_size: 1,
            ..query.clone()
        };
        let t = self.filters.translate(&unpaged)?;
        let handle = self.slave();
        let conn = handle.conn();
        let stmt = conn
            .get_database_backend()
            .build(&count_statement(&handle.table_name(E::TABLE), &t));
        bounded(handle.timeouts().query, "count", fetch_count(conn, stmt)).await
    }

    /// Rows whose primary key is in `ids`, read from a replica.
    ///
    /// # Errors
    /// Returns [`DatasourceError::QueryExecutionFailed`] on storage failure or `queryTimeout`.
    pub async fn read_by_ids<I>(&self, ids: I) -> Result<Vec<E>>
    where
        I: IntoIterator,
        I::Item: Into<Scalar>,
    {
        let handle = self.slave();
        let conn = handle.conn();
        let mut stmt = Query::select();
        stmt.columns(E::COLUMNS.iter().map(|c| Alias::new(*c)))
            .from(Alias::new(handle.table_name(E::TABLE)))
            .and_where(pk_in::<E>(ids.into_iter().map(Into::into).collect()));
        let stmt = conn.get_database_backend().build(&stmt);

        bounded(handle.timeouts().query, "read", async {
            E::find_by_statement(stmt)
                .all(conn)
                .await
                .map_err(Into::into)
        })
        .await
    }

    /// Row by primary key, read from the master.
    ///
    /// # Errors
    /// Returns [`DatasourceError::QueryExecutionFailed`] on storage failure or `queryTimeout`.
    pub async fn read_by_id(&self, id: impl Into<Value>) -> Result<Option<E>> {
        let handle = self.master();
        let conn = handle.conn();
        let mut stmt = Query::select();
        stmt.columns(E::COLUMNS.iter().map(|c| Alias::new(*c)))
            .from(Alias::new(handle.table_name(E::TABLE)))
            .and_where(pk_eq::<E>(id.into()))
            .limit(1);
        let stmt = conn.get_database_backend().build(&stmt);

        bounded(handle.timeouts().query, "read", async {
            E::find_by_statement(stmt)
                .one(conn)
                .await
                .map_err(Into::into)
        })
        .await
    }

    /// Insert one row on the master.
    ///
    /// # Errors
    /// Returns [`DatasourceError::QueryExecutionFailed`]; a unique constraint
    /// violation has kind [`DuplicateKey`](crate::ExecErrorKind::DuplicateKey).
    pub async fn save(&self, entity: &E) -> Result<SaveOutcome> {
        let handle = self.master();
        bounded(
            handle.timeouts().exec,
            "save",
            self.tx_save(handle.conn(), entity),
        )
        .await
    }

    /// Insert one row through `conn`, typically an open transaction.
    ///
    /// # Errors
    /// See [`Repository::save`].
    pub async fn tx_save<C: ConnectionTrait>(&self, conn: &C, entity: &E) -> Result<SaveOutcome> {
        let (columns, values): (Vec<_>, Vec<_>) = entity.values().into_iter().unzip();
        let backend = conn.get_database_backend();

        let mut stmt = Query::insert();
        stmt.into_table(Alias::new(self.table_name()))
            .columns(columns.into_iter().map(Alias::new));
        stmt.values(values.into_iter().map(SimpleExpr::from))
            .map_err(|e| ExecError::statement(&e))?;

        if backend == DatabaseBackend::Postgres {
            stmt.returning_col(Alias::new(E::PRIMARY_KEY));
            let row = conn.query_one(backend.build(&stmt)).await?;
            return Ok(SaveOutcome {
                rows_affected: u64::from(row.is_some()),
                last_insert_id: row.and_then(|r| r.try_get::<i64>("", E::PRIMARY_KEY).ok()),
            });
        }

        let res = conn.execute(backend.build(&stmt)).await?;
        Ok(SaveOutcome {
            rows_affected: res.rows_affected(),
            last_insert_id: i64::try_from(res.last_insert_id()).ok(),
        })
    }

    /// Insert all `entities` in one master transaction bounded by `tranTimeout`.
    ///
    /// The first failing insert rolls back the whole batch. Returns the number
    /// of inserted rows.
    ///
    /// # Errors
    /// See [`Repository::save`].
    pub async fn save_batch(&self, entities: &[E]) -> Result<u64> {
        if entities.is_empty() {
            return Ok(0);
        }
        let handle = self.master();
        let txn = handle.begin().await?;
        let outcome = bounded(handle.timeouts().tran, "save_batch", async {
            let mut rows = 0_u64;
            for entity in entities {
                rows += self.tx_save(&txn, entity).await?.rows_affected;
            }
            Ok::<_, DatasourceError>(rows)
        })
        .await;
        settle(handle, txn, outcome).await
    }

    /// Update the row with primary key `id` on the master.
    ///
    /// Only `columns` are written; an empty slice writes every value but the
    /// primary key. Returns the number of rows changed.
    ///
    /// # Errors
    /// - [`DatasourceError::UnknownColumn`] if `columns` names a column outside [`EntitySchema::COLUMNS`]
    /// - [`DatasourceError::QueryExecutionFailed`] on storage failure or `execTimeout`
    pub async fn update(&self, id: impl Into<Value>, entity: &E, columns: &[&str]) -> Result<u64> {
        let handle = self.master();
        bounded(
            handle.timeouts().exec,
            "update",
            self.tx_update(handle.conn(), id, entity, columns),
        )
        .await
    }

    /// [`Repository::update`] through `conn`, typically an open transaction.
    ///
    /// # Errors
    /// See [`Repository::update`].
    pub async fn tx_update<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: impl Into<Value>,
        entity: &E,
        columns: &[&str],
    ) -> Result<u64> {
        let table = self.table_name();
        if let Some(unknown) = columns.iter().find(|c| !E::COLUMNS.contains(*c)) {
            return Err(DatasourceError::UnknownColumn {
                table,
                column: (*unknown).to_owned(),
            });
        }

        let values: Vec<(Alias, SimpleExpr)> = entity
            .values()
            .into_iter()
            .filter(|(c, _)| *c != E::PRIMARY_KEY && (columns.is_empty() || columns.contains(c)))
            .map(|(c, v)| (Alias::new(c), SimpleExpr::from(v)))
            .collect();
        if values.is_empty() {
            return Ok(0);
        }

        let mut stmt = Query::update();
        stmt.table(Alias::new(table))
            .values(values)
            .and_where(pk_eq::<E>(id.into()));
        let res = conn
            .execute(conn.get_database_backend().build(&stmt))
            .await?;
        Ok(res.rows_affected())
    }

    /// Delete the row with primary key `id` on the master.
    ///
    /// # Errors
    /// Returns [`DatasourceError::QueryExecutionFailed`] on storage failure or `execTimeout`.
    pub async fn delete_by_id(&self, id: impl Into<Value>) -> Result<u64> {
        let handle = self.master();
        let conn = handle.conn();
        let mut stmt = Query::delete();
        stmt.from_table(Alias::new(handle.table_name(E::TABLE)))
            .and_where(pk_eq::<E>(id.into()));
        let stmt = conn.get_database_backend().build(&stmt);

        bounded(handle.timeouts().exec, "delete", async {
            conn.execute(stmt)
                .await
                .map(|r| r.rows_affected())
                .map_err(Into::into)
        })
        .await
    }

    /// Delete every row whose primary key is in `ids` on the master.
    ///
    /// # Errors
    /// Returns [`DatasourceError::QueryExecutionFailed`] on storage failure or `execTimeout`.
    pub async fn delete_by_ids<I>(&self, ids: I) -> Result<u64>
    where
        I: IntoIterator,
        I::Item: Into<Scalar>,
    {
        let handle = self.master();
        let conn = handle.conn();
        let mut stmt = Query::delete();
        stmt.from_table(Alias::new(handle.table_name(E::TABLE)))
            .and_where(pk_in::<E>(ids.into_iter().map(Into::into).collect()));
        let stmt = conn.get_database_backend().build(&stmt);

        bounded(handle.timeouts().exec, "delete", async {
            conn.execute(stmt)
                .await
                .map(|r| r.rows_affected())
                .map_err(Into::into)
        })
        .await
    }

    /// Open a transaction on the master. Dropping it without commit rolls back.
    ///
    /// # Errors
    /// Returns [`DatasourceError::QueryExecutionFailed`] if it cannot be started.
    pub async fn begin(&self) -> Result<DatabaseTransaction> {
        self.master().begin().await
    }

    /// Run `f` in a master transaction bounded by `tranTimeout`.
    ///
    /// Commits when `f` succeeds and rolls back otherwise. The body gets the
    /// transaction by reference; move owned clones of anything else it needs:
    ///
    /// ```ignore
    /// let repo2 = repo.clone();
    /// repo.transaction(move |tx| Box::pin(async move { repo2.tx_save(tx, &row).await })).await?;
    /// ```
    ///
    /// # Errors
    /// Returns the body's error, a timeout, or the commit failure.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> TxFuture<'c, T> + Send,
    {
        let handle = self.master();
        let txn = handle.begin().await?;
        let outcome = bounded(handle.timeouts().tran, "transaction", f(&txn)).await;
        settle(handle, txn, outcome).await
    }
}
