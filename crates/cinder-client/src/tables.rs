//! Table discovery facade.
//!
//! Every operation comes in two forms that produce identical outcomes:
//!
//! - `*_async` takes a sink, invoked exactly once on a client IO thread
//! - the plain form returns a [`Deferred`] built on the sink form

use std::fmt;
use std::sync::Arc;

use crate::name::QualifiedName;
use crate::result::{Deferred, OpResult};
use crate::session::SessionInner;
use crate::table::Table;

/// Table discovery for one session. Cheap to clone.
#[derive(Clone)]
pub struct Tables {
    session: Arc<SessionInner>,
}

impl Tables {
    pub(crate) fn new(session: Arc<SessionInner>) -> Self {
        Self { session }
    }

    /// Looks up a table by name and hands the outcome to `sink`.
    ///
    /// The name is normalized before anything is sent; an invalid identifier
    /// reaches the sink as an invalid-argument error without wire traffic.
    /// An absent table is `Ok(None)`, not an error.
    pub fn get_table_async<F>(&self, name: &str, sink: F)
    where
        F: FnOnce(OpResult<Option<Table>>) + Send + 'static,
    {
        let parsed = QualifiedName::parse_with_schema(name, self.session.default_schema());
        let session = Arc::clone(&self.session);
        self.session.spawn(async move {
            let result = match parsed {
                Ok(name) => {
                    session
                        .call(session.catalog().get_table(&name), |found: &Option<Table>| {
                            usize::from(found.is_some())
                        })
                        .await
                }
                Err(e) => Err(e),
            };
            sink(result.into());
        });
    }

    /// Looks up a table by name.
    pub fn get_table(&self, name: &str) -> Deferred<Option<Table>> {
        let (promise, deferred) = Deferred::pair();
        self.get_table_async(name, promise.into_sink());
        deferred
    }

    /// Lists every table and hands the outcome to `sink`.
    ///
    /// Order is unspecified.
    pub fn list_tables_async<F>(&self, sink: F)
    where
        F: FnOnce(OpResult<Vec<Table>>) + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        self.session.spawn(async move {
            let result = session
                .call(session.catalog().list_tables(), |tables: &Vec<Table>| tables.len())
                .await;
            sink(result.into());
        });
    }

    /// Lists every table.
    pub fn list_tables(&self) -> Deferred<Vec<Table>> {
        let (promise, deferred) = Deferred::pair();
        self.list_tables_async(promise.into_sink());
        deferred
    }
}

impl fmt::Debug for Tables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tables").finish_non_exhaustive()
    }
}
