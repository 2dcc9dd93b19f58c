use std::{future::Future, net::SocketAddr, time::Duration};

use tokio::{
    net::{TcpListener, TcpSocket},
    sync::watch,
    task::JoinSet,
};

use crate::{connection, lottery::coordinator::Handler};

pub struct Server {
    listener: TcpListener,
    coordinator: Handler,
    grace: Duration,
}

impl Server {
    pub fn new(listener: TcpListener, coordinator: Handler, grace: Duration) -> Self {
        Self {
            listener,
            coordinator,
            grace,
        }
    }

    /// Binds a listener with an explicit accept backlog
    pub fn bind(
        addr: SocketAddr,
        backlog: u32,
        coordinator: Handler,
        grace: Duration,
    ) -> std::io::Result<Self> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;

        Ok(Self::new(socket.listen(backlog)?, coordinator, grace))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts agencies until `shutdown` resolves.
    ///
    /// once it does, no new connections are accepted, and the open ones get
    /// the grace period to finish the message they are working on.
    pub async fn run_until<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            coordinator,
            grace,
        } = self;
        tokio::pin!(shutdown);

        let (stop, stopped) = watch::channel(false);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((conn, peer)) => {
                        tracing::info!("accepted a connection from {}", peer);
                        connections.spawn(serve(conn, peer, coordinator.clone(), stopped.clone()));
                    }
                    Err(err) => tracing::warn!("failed to accept a connection: {}", err),
                },
                // reap finished connections as we go
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(err) = joined {
                        tracing::error!("connection task failed: {}", err);
                    }
                }
            }
        }

        drop(listener);
        tracing::info!(
            "shutting down, waiting up to {:?} for {} open connections",
            grace,
            connections.len()
        );

        let _ = stop.send(true);
        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                "grace period is over, dropping {} connections",
                connections.len()
            );
            connections.shutdown().await;
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

async fn serve(
    conn: tokio::net::TcpStream,
    peer: SocketAddr,
    coordinator: Handler,
    shutdown: watch::Receiver<bool>,
) {
    match connection::handle(conn, coordinator, shutdown).await {
        Ok(()) => tracing::info!("connection with {} closed", peer),
        Err(err) => tracing::warn!("connection with {} closed with an error: {:?}", peer, err),
    }
}
