//! Shutdown signal shared by long-running tasks.

use tokio::sync::watch;

/// Resolve once `rx` carries `true` or its sender is gone
pub async fn signalled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_already_set_resolves() {
        let (tx, mut rx) = watch::channel(false);
        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), signalled(&mut rx))
            .await
            .unwrap_or_else(|_| panic!("signal missed"));
    }

    #[tokio::test]
    async fn test_dropped_sender_resolves() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { signalled(&mut rx).await });
        drop(tx);
        assert!(tokio::time::timeout(Duration::from_secs(1), waiter).await.is_ok());
    }
}
