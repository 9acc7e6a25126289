use axum::{
    extract::State,
    middleware,
    response::{Html, IntoResponse},
    routing::get,
    routing::post,
    Json, Router,
};
use dispatchgrid_protocol::{Location, RideRequest, UiUpdate};
use dispatchgrid_engine::{
    dispatch, driver_rows, ride_rows, rider_rows, AnimationScheduler, CommandError,
    CommandGateway, EngineConfig, GridRenderer, HttpAuthority, InteractionController,
    InteractionMode, ModeChange, Notifier, Placed, RideForm, Severity, StateStore, SyncEngine,
};
use serde::Deserialize;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub mod config;
pub mod view;


/// Operator-side state that only the console mutates.
struct UiState {
    controller: InteractionController,
    form: RideForm,
    renderer: GridRenderer,
}

/// One operator console bound to one authority.
pub struct Console {
    gateway: CommandGateway<HttpAuthority>,
    notifier: Notifier,
    animations: Arc<Mutex<AnimationScheduler>>,
    ui: Mutex<UiState>,
}

impl Console {
    pub fn new(authority: HttpAuthority, config: EngineConfig) -> Self {
        let store = Arc::new(StateStore::new());
        let notifier = Notifier::new(&config);
        let sync = Arc::new(SyncEngine::new(
            Arc::new(authority),
            store,
            notifier.clone(),
        ));
        let animations = Arc::new(Mutex::new(AnimationScheduler::new()));
        let gateway = CommandGateway::new(sync, notifier.clone(), animations.clone(), config);
        let mapper = *gateway.mapper();
        Self {
            ui: Mutex::new(UiState {
                controller: InteractionController::new(mapper, notifier.clone()),
                form: RideForm::default(),
                renderer: GridRenderer::new(mapper),
            }),
            gateway,
            notifier,
            animations,
        }
    }

    pub fn sync(&self) -> &Arc<SyncEngine<HttpAuthority>> {
        self.gateway.sync()
    }

    pub fn gateway(&self) -> &CommandGateway<HttpAuthority> {
        &self.gateway
    }

    fn lock_ui(&self) -> MutexGuard<'_, UiState> {
        self.ui.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> InteractionMode {
        self.lock_ui().controller.mode()
    }

    pub fn select_mode(&self, mode: InteractionMode) -> ModeChange {
        self.lock_ui().controller.select_mode(mode)
    }

    /// Resolves a grid click; `None` when the click places nothing.
    pub async fn click(&self, px: f64, py: f64) -> Option<Result<Placed, CommandError>> {
        let placement = self.lock_ui().controller.placement_at(px, py)?;
        tracing::debug!(?placement, "grid click");
        Some(dispatch(&self.gateway, placement).await)
    }

    pub fn update_form(&self, rider_id: Option<&str>, dropoff: Option<Location>) {
        let snapshot = self.sync().store().snapshot();
        let mut ui = self.lock_ui();
        if let Some(id) = rider_id {
            ui.form.select_rider(Some(id).filter(|id| !id.is_empty()), &snapshot);
        }
        if dropoff.is_some() {
            ui.form.set_dropoff(dropoff);
        }
    }

    /// Coordinates typed into the placement form; a missing axis is reported
    /// and places nothing.
    pub fn typed_location(&self, x: Option<i64>, y: Option<i64>) -> Option<Location> {
        match (x, y) {
            (Some(x), Some(y)) => Some(Location::new(x, y)),
            _ => {
                let max = self.gateway.mapper().grid_size() - 1;
                self.notifier.push(
                    format!("Please enter valid coordinates (0-{max})"),
                    Severity::Error,
                );
                None
            }
        }
    }

    pub fn form(&self) -> RideForm {
        self.lock_ui().form.clone()
    }

    /// Submits the form with the dropoff typed at submit time. A missing
    /// dropoff clears the held one, so blank inputs never resend an old ride.
    pub async fn submit_ride(&self, dropoff: Option<Location>) -> Result<RideRequest, CommandError> {
        let draft = {
            let mut ui = self.lock_ui();
            ui.form.set_dropoff(dropoff);
            ui.form.draft()
        };
        self.gateway.request_ride(&draft).await
    }

    /// Rebuilds the whole frame from the held snapshot.
    pub fn frame(&self, event: &str) -> UiUpdate {
        let snapshot = self.sync().store().snapshot();
        let now = Instant::now();
        let notifications = self.notifier.attached(now);
        let mapper = *self.gateway.mapper();

        let mut ui = self.lock_ui();
        let UiState {
            controller,
            form,
            renderer,
        } = &mut *ui;
        form.reconcile(&snapshot);
        let layer = renderer.render(&snapshot);
        let animated = self
            .animations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frame(layer, now);

        let drivers = driver_rows(&snapshot);
        let riders = rider_rows(&snapshot);
        let rides = ride_rows(&snapshot);
        view::frame(
            event,
            view::FrameParts {
                mapper: &mapper,
                layer,
                animated: &animated,
                mode: controller.status(),
                notifications: &notifications,
                drivers: &drivers,
                riders: &riders,
                rides: &rides,
                form,
            },
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    pub console: Arc<Console>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health))
        .route("/api/ui/frame", get(ui_frame))
        .route("/api/ui/mode", post(ui_mode))
        .route("/api/ui/click", post(ui_click))
        .route("/api/ui/ride-form", post(ui_ride_form))
        .route("/api/commands/drivers", post(add_driver))
        .route("/api/commands/riders", post(add_rider))
        .route("/api/commands/drivers/remove", post(remove_driver))
        .route("/api/commands/riders/remove", post(remove_rider))
        .route("/api/commands/rides", post(request_ride))
        .route("/api/commands/rides/cancel", post(cancel_ride))
        .route("/api/commands/tick", post(advance_tick))
        .route("/api/commands/refresh", post(refresh))
        .with_state(Arc::new(state))
        // Local security: allow only loopback + Tailscale by default.
        .layer(middleware::from_fn(ip_allowlist))
        // The console can mutate the simulation. Never answer with
        // `Access-Control-Allow-Origin: *`.
        .layer(local_only_cors())
}

type Shared = State<Arc<AppState>>;

async fn health() -> &'static str {
    "ok"
}

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn ui_frame(State(state): Shared) -> Json<UiUpdate> {
    Json(state.console.frame("ui.frame"))
}

#[derive(Debug, Deserialize)]
struct ModeInput {
    mode: InteractionMode,
}

async fn ui_mode(State(state): Shared, Json(input): Json<ModeInput>) -> Json<UiUpdate> {
    state.console.select_mode(input.mode);
    Json(state.console.frame("ui.mode"))
}

#[derive(Debug, Deserialize)]
struct PixelInput {
    x: f64,
    y: f64,
}

async fn ui_click(State(state): Shared, Json(input): Json<PixelInput>) -> Json<UiUpdate> {
    // Failures are already on the notification banner.
    let _ = state.console.click(input.x, input.y).await;
    Json(state.console.frame("ui.click"))
}

#[derive(Debug, Deserialize)]
struct RideFormInput {
    #[serde(default)]
    rider_id: Option<String>,
    #[serde(default)]
    dropoff: Option<Location>,
}

async fn ui_ride_form(State(state): Shared, Json(input): Json<RideFormInput>) -> Json<UiUpdate> {
    state
        .console
        .update_form(input.rider_id.as_deref(), input.dropoff);
    Json(state.console.frame("ui.ride-form"))
}

#[derive(Debug, Deserialize)]
struct CellInput {
    #[serde(default)]
    x: Option<i64>,
    #[serde(default)]
    y: Option<i64>,
}

async fn add_driver(State(state): Shared, Json(input): Json<CellInput>) -> Json<UiUpdate> {
    if let Some(at) = state.console.typed_location(input.x, input.y) {
        let _ = state.console.gateway().create_driver(at).await;
    }
    Json(state.console.frame("command.driver"))
}

async fn add_rider(State(state): Shared, Json(input): Json<CellInput>) -> Json<UiUpdate> {
    if let Some(at) = state.console.typed_location(input.x, input.y) {
        let _ = state.console.gateway().create_rider(at).await;
    }
    Json(state.console.frame("command.rider"))
}

#[derive(Debug, Deserialize)]
struct IdInput {
    id: String,
}

async fn remove_driver(State(state): Shared, Json(input): Json<IdInput>) -> Json<UiUpdate> {
    let _ = state.console.gateway().remove_driver(&input.id).await;
    Json(state.console.frame("command.driver.remove"))
}

async fn remove_rider(State(state): Shared, Json(input): Json<IdInput>) -> Json<UiUpdate> {
    let _ = state.console.gateway().remove_rider(&input.id).await;
    Json(state.console.frame("command.rider.remove"))
}

#[derive(Debug, Default, Deserialize)]
struct RideInput {
    #[serde(default)]
    dropoff: Option<Location>,
}

async fn request_ride(State(state): Shared, Json(input): Json<RideInput>) -> Json<UiUpdate> {
    let _ = state.console.submit_ride(input.dropoff).await;
    Json(state.console.frame("command.ride"))
}

#[derive(Debug, Deserialize)]
struct CancelInput {
    id: String,
    #[serde(default)]
    confirmed: bool,
}

async fn cancel_ride(State(state): Shared, Json(input): Json<CancelInput>) -> Json<UiUpdate> {
    let _ = state
        .console
        .gateway()
        .cancel_ride(&input.id, |_| input.confirmed)
        .await;
    Json(state.console.frame("command.ride.cancel"))
}

async fn advance_tick(State(state): Shared) -> Json<UiUpdate> {
    let _ = state.console.gateway().advance_tick().await;
    Json(state.console.frame("command.tick"))
}

async fn refresh(State(state): Shared) -> Json<UiUpdate> {
    let _ = state.console.sync().refresh().await;
    Json(state.console.frame("command.refresh"))
}

pub async fn serve(addr: SocketAddr, console: Arc<Console>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_listener(listener, console, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down");
    })
    .await?;
    Ok(())
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    console: Arc<Console>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let app = build_router(AppState { console });
    let addr = listener.local_addr()?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(addr)
}

async fn ip_allowlist(
    axum::extract::ConnectInfo(peer): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let ip = peer.ip();
    if is_allowed_peer_ip(ip) {
        return next.run(req).await;
    }
    tracing::warn!(%ip, "rejected non-local peer");
    (axum::http::StatusCode::FORBIDDEN, "forbidden").into_response()
}

fn is_allowed_peer_ip(ip: IpAddr) -> bool {
    if ip.is_loopback() {
        return true;
    }

    // Tailscale CGNAT range (100.64.0.0/10).
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            o[0] == 100 && (64..=127).contains(&o[1])
        }
        IpAddr::V6(_) => false,
    }
}

fn local_only_cors() -> CorsLayer {
    use axum::http::header;
    use axum::http::HeaderValue;
    use axum::http::Method;

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _req| {
            is_allowed_local_origin(origin)
        }))
}

fn is_allowed_local_origin(origin: &axum::http::HeaderValue) -> bool {
    let Ok(s) = origin.to_str() else {
        return false;
    };
    is_http_origin_for_host(s, "localhost") || is_http_origin_for_host(s, "127.0.0.1")
}

fn is_http_origin_for_host(origin: &str, host: &str) -> bool {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = origin.strip_prefix(scheme) {
            if let Some(after) = rest.strip_prefix(host) {
                // Origin is just scheme://host[:port]
                return after.is_empty() || after.starts_with(':');
            }
        }
    }
    false
}

const DASHBOARD_HTML: &str = r###"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <meta name="theme-color" content="#081427" />
  <title>Dispatch Grid</title>
  <style>
    :root{
      --bg-a:#050913;
      --bg-b:#081325;
      --ice:#e6fbff;
      --teal:#6ff8ff;
      --blue:#68c7ff;
      --panel:#0b1a2dcc;
      --panel-edge:#73c7ff55;
      --muted:#8aa3be;
      --ok:#4df5bf;
      --warn:#ffd06b;
      --bad:#ff7198;
      --screen-pad:12px;
    }
    *{box-sizing:border-box;margin:0;padding:0}
    body{
      font-family:Inter,system-ui,sans-serif;color:var(--ice);min-height:100vh;
      background:linear-gradient(165deg,var(--bg-b) 0%,var(--bg-a) 100%);
    }
    .topbar{
      display:flex;gap:12px;align-items:center;justify-content:space-between;
      margin:var(--screen-pad);padding:10px 12px;border:1px solid var(--panel-edge);border-radius:14px;
      background:linear-gradient(160deg,#0c223b 0%, #081427 100%);
    }
    .topbar h1{font-size:14px;letter-spacing:.7px}
    .pill{display:flex;align-items:center;gap:8px;font-size:12px;color:var(--muted)}
    .dot{width:8px;height:8px;border-radius:99px;background:var(--warn)}
    .dot.ok{background:var(--ok)}
    .btn{
      border:1px solid #4f799f;background:#0b1b30;color:var(--ice);
      border-radius:10px;padding:8px 10px;font-weight:600;cursor:pointer;
    }
    .btn:hover{border-color:#8de7ff}
    .btn.active{border-color:var(--teal);box-shadow:0 0 0 1px #6ff8ff66 inset}
    .btn.small{padding:3px 8px;font-size:11px;border-radius:8px}
    .main{display:flex;gap:var(--screen-pad);padding:0 var(--screen-pad) var(--screen-pad)}
    .card{padding:10px;border:1px solid var(--panel-edge);border-radius:16px;background:var(--panel)}
    .card h2{font-size:12px;color:var(--muted);text-transform:uppercase;margin-bottom:8px}
    .side{flex:1;display:flex;flex-direction:column;gap:var(--screen-pad);min-width:320px}
    #grid{position:relative;background-color:#06101f;
      background-image:linear-gradient(#7fcbff14 1px,transparent 1px),linear-gradient(90deg,#7fcbff14 1px,transparent 1px);}
    .entity{position:absolute;border-radius:2px;pointer-events:auto}
    .entity.driver{background:var(--ok);border-radius:99px;z-index:3}
    .entity.driver.assigned{background:var(--warn)}
    .entity.driver.on_trip{background:var(--blue)}
    .entity.driver.offline{background:var(--muted)}
    .entity.rider{background:var(--bad);z-index:2}
    .entity.pickup{outline:2px solid var(--warn);z-index:1}
    .entity.dropoff{outline:2px solid var(--teal);z-index:1}
    .entity.path{background:#68c7ff40;pointer-events:none}
    #notification{position:fixed;right:16px;bottom:16px;z-index:60;display:flex;flex-direction:column;gap:8px}
    .notification{display:flex;gap:8px;padding:10px 14px;border-radius:12px;border:1px solid var(--panel-edge);background:#0b1b30;opacity:1;transition:opacity .3s ease,transform .3s ease}
    .notification.retiring{opacity:0;transform:translateY(6px)}
    .notification.expiring{opacity:0;transition-duration:.4s}
    .notification.success{border-color:var(--ok)}
    .notification.error{border-color:var(--bad)}
    .notification.warning{border-color:var(--warn)}
    table{width:100%;border-collapse:collapse;font-size:12px}
    th,td{text-align:left;padding:4px 6px;border-bottom:1px solid #7fcbff22}
    .status{font-size:11px;color:var(--muted)}
    .muted,.empty{color:var(--muted);font-size:12px}
    input,select{background:#06101f;color:var(--ice);border:1px solid #4f799f;border-radius:8px;padding:5px;width:70px}
    select{width:auto}
    .row{display:flex;gap:8px;align-items:center;flex-wrap:wrap;margin-bottom:6px}
  </style>
</head>
<body>
  <header class="topbar">
    <h1>DISPATCH GRID</h1>
    <div class="row">
      <button class="btn" data-mode="none" type="button">View</button>
      <button class="btn" data-mode="driver" type="button">Add Drivers</button>
      <button class="btn" data-mode="rider" type="button">Add Riders</button>
      <button class="btn" id="tickBtn" type="button">Advance Tick</button>
      <button class="btn" id="refreshBtn" type="button">Refresh</button>
    </div>
    <div class="pill"><span id="mode.status">View Only</span></div>
    <div class="pill"><span id="connDot" class="dot"></span><span id="connText">connecting</span></div>
  </header>
  <div class="main">
    <div class="card"><div id="grid"></div></div>
    <div class="side">
      <div class="card">
        <h2>Place at coordinates</h2>
        <div class="row">
          <input id="placeX" type="number" placeholder="x" />
          <input id="placeY" type="number" placeholder="y" />
          <button class="btn small" id="addDriverBtn" type="button">Add Driver</button>
          <button class="btn small" id="addRiderBtn" type="button">Add Rider</button>
        </div>
      </div>
      <div class="card">
        <h2>Request ride</h2>
        <div class="row"><select id="form.rider"></select><span class="muted" id="pickupText">pickup: none</span></div>
        <div class="row">
          <input id="dropoffX" type="number" placeholder="x" />
          <input id="dropoffY" type="number" placeholder="y" />
          <button class="btn small" id="rideBtn" type="button">Request Ride</button>
        </div>
      </div>
      <div class="card"><h2>Drivers</h2><div id="table.drivers"></div></div>
      <div class="card"><h2>Riders</h2><div id="table.riders"></div></div>
      <div class="card"><h2>Rides</h2><div id="table.rides"></div></div>
    </div>
  </div>
  <div id="notification"></div>
  <script>
  (function(){
    const $ = (id) => document.getElementById(id);
    const grid = $("grid");
    let animating = false;

    function apply(update){
      if (!update || !Array.isArray(update.patches)) return;
      for (const p of update.patches){
        const t = document.getElementById(p.target);
        if (!t) continue;
        if (p.swap === "remove"){
          t.innerHTML = "";
          continue;
        }
        if (p.target === "notification"){
          reconcileNotifications(t, p.html || "");
          continue;
        }
        t.innerHTML = p.html || "";
        if (p.target === "grid" && p.payload){
          grid.style.width = p.payload.extent + "px";
          grid.style.height = p.payload.extent + "px";
          grid.style.backgroundSize = p.payload.scale * 10 + "px " + p.payload.scale * 10 + "px";
        }
        if (p.target === "mode.status" && p.payload){
          grid.style.cursor = p.payload.cursor;
          for (const b of document.querySelectorAll("[data-mode]")){
            b.classList.toggle("active", b.dataset.mode === p.payload.mode);
          }
        }
        if (p.target === "form.rider" && p.payload){
          const pk = p.payload.pickup;
          $("pickupText").textContent = pk ? `pickup: (${pk.x}, ${pk.y})` : "pickup: none";
        }
      }
      const wasAnimating = animating;
      animating = !!(update.payload && (update.payload.animating || update.payload.fading));
      if (animating && !wasAnimating) requestAnimationFrame(animate);
    }

    // Keeps existing entries in place and only swaps their class, so a phase
    // change runs the css fade instead of replacing the element.
    function reconcileNotifications(box, html){
      const tpl = document.createElement("template");
      tpl.innerHTML = html;
      const keep = new Set();
      for (const next of Array.from(tpl.content.children)){
        const id = next.dataset.id;
        keep.add(id);
        const cur = box.querySelector(`[data-id="${id}"]`);
        if (cur) cur.className = next.className;
        else box.appendChild(next);
      }
      for (const el of Array.from(box.children)){
        if (!keep.has(el.dataset.id)) el.remove();
      }
    }

    async function send(path, body){
      const init = body === undefined
        ? { cache: "no-store" }
        : { method: "POST", headers: { "content-type": "application/json" }, body: JSON.stringify(body) };
      try{
        const r = await fetch(path, init);
        if (!r.ok) throw new Error("bad");
        $("connDot").classList.add("ok");
        $("connText").textContent = "online";
        apply(await r.json());
      }catch(_e){
        $("connDot").classList.remove("ok");
        $("connText").textContent = "offline";
      }
    }

    async function animate(){
      await send("/api/ui/frame");
      if (animating) requestAnimationFrame(animate);
    }

    function int(id){
      const v = parseInt($(id).value, 10);
      return Number.isNaN(v) ? null : v;
    }

    for (const b of document.querySelectorAll("[data-mode]")){
      b.addEventListener("click", () => send("/api/ui/mode", { mode: b.dataset.mode }));
    }
    $("tickBtn").addEventListener("click", () => send("/api/commands/tick", {}));
    $("refreshBtn").addEventListener("click", () => send("/api/commands/refresh", {}));
    $("addDriverBtn").addEventListener("click", () => send("/api/commands/drivers", { x: int("placeX"), y: int("placeY") }));
    $("addRiderBtn").addEventListener("click", () => send("/api/commands/riders", { x: int("placeX"), y: int("placeY") }));
    $("form.rider").addEventListener("change", (e) => send("/api/ui/ride-form", { rider_id: e.target.value }));
    $("rideBtn").addEventListener("click", () => {
      const x = int("dropoffX"), y = int("dropoffY");
      send("/api/commands/rides", x === null || y === null ? {} : { dropoff: { x, y } });
    });

    grid.addEventListener("click", (e) => {
      const rect = grid.getBoundingClientRect();
      send("/api/ui/click", { x: e.clientX - rect.left, y: e.clientY - rect.top });
    });

    document.addEventListener("click", (e) => {
      const b = e.target.closest("[data-action]");
      if (!b) return;
      const id = b.dataset.id;
      if (b.dataset.action === "remove-driver") send("/api/commands/drivers/remove", { id });
      if (b.dataset.action === "remove-rider") send("/api/commands/riders/remove", { id });
      if (b.dataset.action === "cancel-ride"){
        const confirmed = confirm(`Are you sure you want to cancel ride ${id}?`);
        send("/api/commands/rides/cancel", { id, confirmed });
      }
    });

    send("/api/commands/refresh", {});
    setInterval(() => { if (!animating) send("/api/ui/frame"); }, 1000);
  })();
  </script>
</body>
</html>
"###;
