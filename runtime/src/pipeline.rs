//! Pipeline values: deferred descriptions of an app or router.
//!
//! A [`Pipeline`] is pure data. Combinators append registrations and return
//! a new pipeline; nothing is validated, allocated per request or executed
//! until [`Pipeline::build`] runs it with a capability set. Building is the
//! only step that can fail ([`BuildError`]), and it yields an immutable
//! [`Artifact`].
//!
//! # Capabilities
//!
//! The `Env` parameter is the capability set every handler in the pipeline
//! can reach through [`HandlerContext::env`]. Routers needing different
//! capabilities are expressed as functions generic over trait bounds, so
//! mounting them into one app requires the union of those bounds:
//!
//! ```ignore
//! fn user_router<Env: HasFiles + Send + Sync + 'static>() -> Pipeline<Env> { ... }
//! fn health_router<Env: HasHealth + Send + Sync + 'static>() -> Pipeline<Env> { ... }
//!
//! // Env: HasFiles + HasHealth
//! let app = Pipeline::app()
//!     .mount("/user", user_router())
//!     .mount("/health", health_router());
//! ```

use crate::adapter::{self, ExitPolicy, ForwardErrors, Handler, HandlerContext, Typed};
use crate::error::BuildError;
use crate::native::{ErrorHandler, NativeHandler, Request, Response};
use crate::table::{Layer, LayerKind, RouteEntry, RoutingTable};
use composable_http_core::{BoxError, ConstructionError, MatchOptions, Method, PathParams, PathPattern};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Which artifact a pipeline produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A top-level application that can be served.
    App,
    /// A router meant to be mounted.
    Router,
}

/// Matching options for an app or router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterOptions {
    /// Literal path segments must match case exactly.
    pub case_sensitive: bool,
    /// `/a` and `/a/` are different paths.
    pub strict: bool,
}

impl From<RouterOptions> for MatchOptions {
    fn from(options: RouterOptions) -> Self {
        Self {
            case_sensitive: options.case_sensitive,
            strict: options.strict,
        }
    }
}

type MakeHandler<Env> = Box<dyn FnOnce(Arc<str>, Arc<Env>) -> NativeHandler + Send>;
type Factory<Env> =
    Box<dyn FnOnce(Arc<Env>) -> BoxFuture<'static, Result<Vec<NativeHandler>, BoxError>> + Send>;
type BuildErrHook = Arc<dyn Fn(&BuildError) + Send + Sync>;

enum Registration<Env> {
    /// Effect route, adapted per request.
    Route {
        method: Method,
        path: String,
        make: MakeHandler<Env>,
        expects: Option<&'static [&'static str]>,
    },
    /// Native route handlers, registered as given.
    Classic {
        method: Method,
        path: String,
        handlers: Vec<NativeHandler>,
    },
    /// Effect middleware.
    Use { path: String, make: MakeHandler<Env> },
    /// Native middleware.
    ClassicUse {
        path: String,
        handlers: Vec<NativeHandler>,
    },
    /// Native middleware produced once, at build.
    Factory { path: String, factory: Factory<Env> },
    Mount { path: String, pipeline: Pipeline<Env> },
    Error { path: String, handler: ErrorHandler },
}

/// A deferred app or router description requiring capabilities `Env`.
pub struct Pipeline<Env> {
    kind: ArtifactKind,
    options: RouterOptions,
    registrations: Vec<Registration<Env>>,
    on_build_err: Vec<BuildErrHook>,
}

impl<Env> std::fmt::Debug for Pipeline<Env> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("kind", &self.kind)
            .field("options", &self.options)
            .field("registrations", &self.registrations.len())
            .finish_non_exhaustive()
    }
}

/// A router pipeline paired with the path its parent should mount it at.
#[derive(Debug)]
pub struct Scoped<Env> {
    mount_path: String,
    router: Pipeline<Env>,
}

impl<Env> Scoped<Env> {
    /// Pair `router` with `mount_path`.
    #[must_use]
    pub fn new(mount_path: impl Into<String>, router: Pipeline<Env>) -> Self {
        Self {
            mount_path: mount_path.into(),
            router,
        }
    }

    /// Where the parent mounts this router.
    #[must_use]
    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    /// The router pipeline.
    #[must_use]
    pub const fn router(&self) -> &Pipeline<Env> {
        &self.router
    }
}

impl<Env> Pipeline<Env> {
    fn empty(kind: ArtifactKind, options: RouterOptions) -> Self {
        Self {
            kind,
            options,
            registrations: Vec::new(),
            on_build_err: Vec::new(),
        }
    }

    /// Describe a new application.
    #[must_use]
    pub fn app() -> Self {
        Self::empty(ArtifactKind::App, RouterOptions::default())
    }

    /// Describe a new router with default options.
    #[must_use]
    pub fn router() -> Self {
        Self::empty(ArtifactKind::Router, RouterOptions::default())
    }

    /// Describe a new router with explicit matching options.
    #[must_use]
    pub fn router_with(options: RouterOptions) -> Self {
        Self::empty(ArtifactKind::Router, options)
    }

    /// What [`build`](Self::build) will produce.
    #[must_use]
    pub const fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Number of registrations at this level (mounts count once).
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether nothing has been registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    fn register(mut self, registration: Registration<Env>) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Attach native handlers for `method` at `path`, without context
    /// injection or outcome handling.
    #[must_use]
    pub fn classic(
        self,
        method: Method,
        path: impl Into<String>,
        handlers: impl IntoIterator<Item = NativeHandler>,
    ) -> Self {
        self.register(Registration::Classic {
            method,
            path: path.into(),
            handlers: handlers.into_iter().collect(),
        })
    }

    /// Attach native middleware for every path.
    #[must_use]
    pub fn classic_use(self, handlers: impl IntoIterator<Item = NativeHandler>) -> Self {
        self.classic_use_at("/", handlers)
    }

    /// Attach native middleware under `path`.
    #[must_use]
    pub fn classic_use_at(
        self,
        path: impl Into<String>,
        handlers: impl IntoIterator<Item = NativeHandler>,
    ) -> Self {
        self.register(Registration::ClassicUse {
            path: path.into(),
            handlers: handlers.into_iter().collect(),
        })
    }

    /// Mount `router` under `path`.
    ///
    /// The router's paths are relative to `path`; its internals are otherwise
    /// opaque to this pipeline.
    #[must_use]
    pub fn mount(self, path: impl Into<String>, router: Self) -> Self {
        self.register(Registration::Mount {
            path: path.into(),
            pipeline: router,
        })
    }

    /// Mount a [`Scoped`] router at its declared path.
    #[must_use]
    pub fn mount_scoped(self, scoped: Scoped<Env>) -> Self {
        self.mount(scoped.mount_path, scoped.router)
    }

    /// Pair this pipeline with the path a parent should mount it at.
    #[must_use]
    pub fn scoped(self, mount_path: impl Into<String>) -> Scoped<Env> {
        Scoped::new(mount_path, self)
    }

    /// Attach error middleware for every path.
    ///
    /// Error middleware only runs once a layer has failed its continuation.
    #[must_use]
    pub fn on_error(self, handler: ErrorHandler) -> Self {
        self.register(Registration::Error {
            path: "/".to_string(),
            handler,
        })
    }

    /// Observe a failed build of this pipeline (including mounted routers'
    /// failures) before the error propagates.
    #[must_use]
    pub fn inspect_build_err<F>(mut self, hook: F) -> Self
    where
        F: Fn(&BuildError) + Send + Sync + 'static,
    {
        self.on_build_err.push(Arc::new(hook));
        self
    }
}

macro_rules! method_combinators {
    ($($(#[$doc:meta])* $name:ident => $method:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $name<E, H>(self, path: impl Into<String>, handler: H) -> Self
            where
                E: Into<BoxError> + Send + 'static,
                H: Handler<Env, E>,
            {
                self.route(Method::$method, path, handler)
            }
        )*
    };
}

impl<Env: Send + Sync + 'static> Pipeline<Env> {
    /// Attach an effect handler for `method` at `path` with the default
    /// exit policy ([`ForwardErrors`]).
    #[must_use]
    pub fn route<E, H>(self, method: Method, path: impl Into<String>, handler: H) -> Self
    where
        E: Into<BoxError> + Send + 'static,
        H: Handler<Env, E>,
    {
        self.route_with(method, path, handler, ForwardErrors)
    }

    /// Attach an effect handler with a custom exit policy.
    #[must_use]
    pub fn route_with<E, H, X>(
        self,
        method: Method,
        path: impl Into<String>,
        handler: H,
        policy: X,
    ) -> Self
    where
        E: Send + 'static,
        H: Handler<Env, E>,
        X: ExitPolicy<E>,
    {
        self.register(Registration::Route {
            method,
            path: path.into(),
            make: make_handler(handler, policy),
            expects: None,
        })
    }

    /// Attach an effect handler that receives typed path parameters.
    ///
    /// The build fails with [`ConstructionError::ParamMismatch`] unless the
    /// pattern declares exactly `P::NAMES`.
    #[must_use]
    pub fn route_typed<P, E, H, Fut>(self, method: Method, path: impl Into<String>, handler: H) -> Self
    where
        P: PathParams,
        E: Into<BoxError> + 'static,
        H: Fn(HandlerContext<Env>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.route_typed_with(method, path, handler, ForwardErrors)
    }

    /// Typed route with a custom exit policy.
    ///
    /// Handler errors reach the policy as [`BoxError`], as do missing
    /// parameters.
    #[must_use]
    pub fn route_typed_with<P, E, H, Fut, X>(
        self,
        method: Method,
        path: impl Into<String>,
        handler: H,
        policy: X,
    ) -> Self
    where
        P: PathParams,
        E: Into<BoxError> + 'static,
        H: Fn(HandlerContext<Env>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        X: ExitPolicy<BoxError>,
    {
        self.register(Registration::Route {
            method,
            path: path.into(),
            make: make_handler(Typed::new(handler), policy),
            expects: Some(P::NAMES),
        })
    }

    /// [`route_typed`](Self::route_typed) for `GET`.
    #[must_use]
    pub fn get_typed<P, E, H, Fut>(self, path: impl Into<String>, handler: H) -> Self
    where
        P: PathParams,
        E: Into<BoxError> + 'static,
        H: Fn(HandlerContext<Env>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.route_typed(Method::Get, path, handler)
    }

    method_combinators! {
        /// Effect handler for `GET` (also serves `HEAD`).
        get => Get,
        /// Effect handler for `POST`.
        post => Post,
        /// Effect handler for `PUT`.
        put => Put,
        /// Effect handler for `PATCH`.
        patch => Patch,
        /// Effect handler for `DELETE`.
        delete => Delete,
        /// Effect handler for `HEAD`.
        head => Head,
        /// Effect handler for `OPTIONS`.
        options => Options,
        /// Effect handler for every method.
        all => All,
    }

    /// Attach effect middleware for every path.
    ///
    /// Middleware must call `next().proceed()` to let later layers run.
    #[must_use]
    pub fn use_handler<E, H>(self, handler: H) -> Self
    where
        E: Into<BoxError> + Send + 'static,
        H: Handler<Env, E>,
    {
        self.use_handler_at("/", handler)
    }

    /// Attach effect middleware under `path`.
    #[must_use]
    pub fn use_handler_at<E, H>(self, path: impl Into<String>, handler: H) -> Self
    where
        E: Into<BoxError> + Send + 'static,
        H: Handler<Env, E>,
    {
        self.register(Registration::Use {
            path: path.into(),
            make: make_handler(handler, ForwardErrors),
        })
    }

    /// Attach middleware produced by `factory` for every path.
    ///
    /// The factory runs once, at build, with the capability set.
    #[must_use]
    pub fn use_effect<F, Fut, Err>(self, factory: F) -> Self
    where
        F: FnOnce(Arc<Env>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<NativeHandler>, Err>> + Send + 'static,
        Err: Into<BoxError>,
    {
        self.use_effect_at("/", factory)
    }

    /// Attach middleware produced by `factory` under `path`.
    #[must_use]
    pub fn use_effect_at<F, Fut, Err>(self, path: impl Into<String>, factory: F) -> Self
    where
        F: FnOnce(Arc<Env>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<NativeHandler>, Err>> + Send + 'static,
        Err: Into<BoxError>,
    {
        let factory: Factory<Env> = Box::new(move |env| {
            Box::pin(async move { factory(env).await.map_err(Into::into) })
        });
        self.register(Registration::Factory {
            path: path.into(),
            factory,
        })
    }

    /// Execute the pipeline: validate every pattern, run factories and
    /// finalize the routing table.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Construction`] for an invalid pattern or a typed
    /// route whose pattern does not match its parameter struct, and
    /// [`BuildError::Factory`] if a factory fails.
    pub async fn build(self, env: Arc<Env>) -> Result<Artifact, BuildError> {
        let kind = self.kind;
        let table = Arc::new(self.finalize(env).await?);
        tracing::debug!(?kind, layers = table.len(), "pipeline built");
        Ok(match kind {
            ArtifactKind::App => Artifact::App(App { table }),
            ArtifactKind::Router => Artifact::Router(Router { table }),
        })
    }

    fn finalize(self, env: Arc<Env>) -> BoxFuture<'static, Result<RoutingTable, BuildError>> {
        Box::pin(async move {
            let Self {
                options,
                registrations,
                on_build_err,
                ..
            } = self;
            let result = assemble(registrations, options.into(), env).await;
            if let Err(err) = &result {
                for hook in &on_build_err {
                    hook(err);
                }
            }
            result
        })
    }
}

fn make_handler<Env, E, H, X>(handler: H, policy: X) -> MakeHandler<Env>
where
    Env: Send + Sync + 'static,
    E: Send + 'static,
    H: Handler<Env, E>,
    X: ExitPolicy<E>,
{
    Box::new(move |route, env| adapter::adapt(route, env, Arc::new(handler), Arc::new(policy)))
}

async fn assemble<Env: Send + Sync + 'static>(
    registrations: Vec<Registration<Env>>,
    options: MatchOptions,
    env: Arc<Env>,
) -> Result<RoutingTable, BuildError> {
    let mut layers = Vec::with_capacity(registrations.len());

    for registration in registrations {
        match registration {
            Registration::Route {
                method,
                path,
                make,
                expects,
            } => {
                let pattern = PathPattern::parse(&path)?;
                if let Some(expected) = expects {
                    check_params(&pattern, expected)?;
                }
                let label: Arc<str> = Arc::from(format!("{method} {path}"));
                let handler = make(label, Arc::clone(&env));
                layers.push(Layer {
                    pattern,
                    kind: LayerKind::Route { method, handler },
                });
            },
            Registration::Classic {
                method,
                path,
                handlers,
            } => {
                let pattern = PathPattern::parse(&path)?;
                layers.extend(handlers.into_iter().map(|handler| Layer {
                    pattern: pattern.clone(),
                    kind: LayerKind::Route { method, handler },
                }));
            },
            Registration::Use { path, make } => {
                let pattern = PathPattern::parse(&path)?;
                let label: Arc<str> = Arc::from(format!("USE {path}"));
                layers.push(Layer {
                    pattern,
                    kind: LayerKind::Middleware(make(label, Arc::clone(&env))),
                });
            },
            Registration::ClassicUse { path, handlers } => {
                let pattern = PathPattern::parse(&path)?;
                layers.extend(handlers.into_iter().map(|handler| Layer {
                    pattern: pattern.clone(),
                    kind: LayerKind::Middleware(handler),
                }));
            },
            Registration::Factory { path, factory } => {
                let pattern = PathPattern::parse(&path)?;
                let handlers = factory(Arc::clone(&env))
                    .await
                    .map_err(|source| BuildError::Factory {
                        path: path.clone(),
                        source,
                    })?;
                layers.extend(handlers.into_iter().map(|handler| Layer {
                    pattern: pattern.clone(),
                    kind: LayerKind::Middleware(handler),
                }));
            },
            Registration::Mount { path, pipeline } => {
                let pattern = PathPattern::parse(&path)?;
                let table = pipeline.finalize(Arc::clone(&env)).await?;
                layers.push(Layer {
                    pattern,
                    kind: LayerKind::Mount(Arc::new(table)),
                });
            },
            Registration::Error { path, handler } => {
                layers.push(Layer {
                    pattern: PathPattern::parse(&path)?,
                    kind: LayerKind::Error(handler),
                });
            },
        }
    }

    Ok(RoutingTable::new(layers, options))
}

/// The pattern must declare exactly the names the typed handler reads.
fn check_params(pattern: &PathPattern, expected: &[&str]) -> Result<(), ConstructionError> {
    let found = pattern.param_names();
    let same = found.len() == expected.len()
        && expected.iter().all(|name| found.iter().any(|f| f == name));
    if same {
        return Ok(());
    }
    Err(ConstructionError::ParamMismatch {
        pattern: pattern.as_str().to_string(),
        expected: expected.iter().map(ToString::to_string).collect(),
        found: found.to_vec(),
    })
}

// ============================================================================
// Artifacts
// ============================================================================

/// The product of a built pipeline.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// Built from [`Pipeline::app`].
    App(App),
    /// Built from [`Pipeline::router`].
    Router(Router),
}

impl Artifact {
    /// Which variant this is.
    #[must_use]
    pub const fn kind(&self) -> ArtifactKind {
        match self {
            Self::App(_) => ArtifactKind::App,
            Self::Router(_) => ArtifactKind::Router,
        }
    }

    /// The application, if this is one.
    #[must_use]
    pub fn into_app(self) -> Option<App> {
        match self {
            Self::App(app) => Some(app),
            Self::Router(_) => None,
        }
    }

    /// The router, if this is one.
    #[must_use]
    pub fn into_router(self) -> Option<Router> {
        match self {
            Self::Router(router) => Some(router),
            Self::App(_) => None,
        }
    }

    fn table(&self) -> &RoutingTable {
        match self {
            Self::App(app) => &app.table,
            Self::Router(router) => &router.table,
        }
    }

    /// Dispatch one request.
    pub async fn handle(&self, request: Request) -> Response {
        self.table().handle(request).await
    }

    /// Registered routes in dispatch order.
    #[must_use]
    pub fn routes(&self) -> Vec<RouteEntry> {
        self.table().routes()
    }
}

/// A built application.
#[derive(Debug, Clone)]
pub struct App {
    table: Arc<RoutingTable>,
}

impl App {
    /// Dispatch one request through the app, including the final handler.
    pub async fn handle(&self, request: Request) -> Response {
        self.table.handle(request).await
    }

    /// Registered routes in dispatch order, with mount prefixes applied.
    #[must_use]
    pub fn routes(&self) -> Vec<RouteEntry> {
        self.table.routes()
    }
}

/// A built router.
#[derive(Debug, Clone)]
pub struct Router {
    table: Arc<RoutingTable>,
}

impl Router {
    /// Dispatch one request as if the router were the app.
    pub async fn handle(&self, request: Request) -> Response {
        self.table.handle(request).await
    }

    /// Registered routes in dispatch order.
    #[must_use]
    pub fn routes(&self) -> Vec<RouteEntry> {
        self.table.routes()
    }
}
