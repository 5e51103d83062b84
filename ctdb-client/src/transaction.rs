/// Transaction control for a session
///
/// A session holds at most one transaction. Starting a second one, or
/// finishing one that was never started, fails locally without a request.
use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::response::{collect, Record};
use ctdb_proto as proto;
use tracing::debug;

impl Client {
    /// Id of the open transaction, if any
    pub fn transaction_id(&self) -> Option<i64> {
        self.tx.as_ref().map(|tx| tx.value)
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Begin a transaction that all further requests are attached to
    pub async fn start_transaction(&mut self) -> Result<i64> {
        if let Some(tx) = &self.tx {
            return Err(ClientError::TransactionAlreadyRunning(tx.value));
        }

        let tx_id = self.txn.begin(()).await?.into_inner();
        debug!(tx = tx_id.value, "transaction started");
        let id = tx_id.value;
        self.tx = Some(tx_id);
        Ok(id)
    }

    /// Commit the open transaction
    pub async fn commit_transaction(&mut self) -> Result<()> {
        let tx_id = self.open_transaction()?;
        self.txn.commit(tx_id.clone()).await?;
        debug!(tx = tx_id.value, "transaction committed");
        self.tx = None;
        Ok(())
    }

    /// Roll back the open transaction
    pub async fn abort_transaction(&mut self) -> Result<()> {
        let tx_id = self.open_transaction()?;
        self.txn.rollback(tx_id.clone()).await?;
        debug!(tx = tx_id.value, "transaction rolled back");
        self.tx = None;
        Ok(())
    }

    /// Ask the server to kill the open transaction
    pub async fn kill_transaction(&mut self) -> Result<()> {
        let tx_id = self.open_transaction()?;
        self.txn.kill(tx_id.clone()).await?;
        debug!(tx = tx_id.value, "transaction killed");
        self.tx = None;
        Ok(())
    }

    /// All transactions active on the server
    pub async fn list_transactions(&mut self) -> Result<Vec<Record>> {
        debug!("list transactions");
        let stream = self.txn.list_transactions(()).await?.into_inner();
        collect(stream).await
    }

    /// All locks currently held on database objects
    pub async fn list_locks(&mut self) -> Result<Vec<Record>> {
        debug!("list locks");
        let stream = self.txn.list_locks(()).await?.into_inner();
        collect(stream).await
    }

    fn open_transaction(&self) -> Result<proto::TransactionId> {
        self.tx.clone().ok_or(ClientError::NoTransaction)
    }
}
