//! # Tower Inflight
//!
//! `tower-inflight` manages outgoing calls for a client application. It decides
//! whether a call is sent or suppressed, tracks every call in flight so it can be
//! aborted individually or all at once, and always hands the caller the same
//! kind of awaitable [`Handle`].
//!
//! ## The Lifecycle
//!
//! 1. **Throttling**: Each action has an [`ActionPolicy`]. An exclusive action
//!    suppresses new calls while one is pending. Suppressed calls never reach
//!    the transport and settle as [`Outcome::Suppressed`] once the serving call
//!    settles.
//! 2. **Tracking**: Admitted calls are registered with a [`RequestTracker`] until
//!    their [`CancellationToken`] settles. The tracker answers `has_pending` for
//!    the whole resource.
//! 3. **Cancellation**: Settlement happens exactly once. Natural completion,
//!    transport failure and `abort()` race for it, and the first one wins.
//!
//! Transports are plain [`Transport`] implementations or any tower `Service`,
//! either bound per action in a [`Resource`] or wrapped with [`TrackLayer`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use tower_inflight::ActionPolicy;
//! use tower_inflight::Resource;
//!
//! # async fn run() -> Result<(), tower_inflight::RequestError> {
//! let echo = tower::service_fn(|n: u32| async move { Ok::<_, tower::BoxError>(n) });
//! let resource = Resource::<u32, u32>::builder()
//!     .service("query", ActionPolicy::exclusive(), echo)
//!     .build();
//!
//! let handle = resource.invoke("query", 7)?;
//! assert_eq!(handle.await.into_result()?, 7);
//! # Ok(())
//! # }
//! ```

mod error;
mod handle;
mod layer;
mod resource;
mod service;
mod token;
mod tracker;
mod transport;
mod wrapper;


pub use error::RequestError;
pub use handle::Handle;
pub use handle::Placeholder;
pub use inflight_gate::ActionKey;
pub use inflight_gate::ActionPolicy;
pub use layer::TrackLayer;
pub use resource::Resource;
pub use resource::ResourceBuilder;
pub use service::TrackService;
pub use token::AbortHandle;
pub use token::CancelSignal;
pub use token::CancellationToken;
pub use token::Completion;
pub use token::Listener;
pub use token::Outcome;
pub use token::Settlement;
pub use token::TokenId;
pub use tracker::PendingEntry;
pub use tracker::RequestTracker;
pub use transport::Dispatch;
pub use transport::ServiceTransport;
pub use transport::Transport;
pub use transport::TransportFn;
pub use transport::transport_fn;
pub use wrapper::invoke;
