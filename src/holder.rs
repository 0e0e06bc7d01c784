use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};
use derivative::Derivative;
use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex, ReentrantMutex};
use crate::error::{HolderError, Result};
use crate::lifecycle::{Anchor, Callback, FollowerTable, KeepAlive};
use crate::uid::{FollowerId, HolderId};

/// Anything a holder can hold: cloned out on `get`, shared between threads.
pub trait Holdable: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Holdable for T {}

/// Payloads which have an "absent" state, rejected by not-null holders.
pub trait Absent {
    fn is_absent(&self) -> bool;
}

impl<U> Absent for Option<U> {
    fn is_absent(&self) -> bool {
        self.is_none()
    }
}

/// Whether a holder has ever received a value. Goes from `Absent` to `Present` once, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    Absent,
    Present,
}

/// The single write seam used by whatever decides *when* a value arrives
/// (a scheduler, a remote cache, a sensor poller...).
///
/// Each published value must be a complete "latest known state".
pub trait Publish<T> {
    fn publish(&self, value: T) -> Result<()>;
}

/// A single-slot reactive value which may not exist yet.
///
/// Readers either [Holder::get] the latest value, blocking until the first one arrived, or
/// [Holder::follow] it to be called with the current value and every later one.
/// Writers [Holder::set] it, which synchronously runs every follower, in registration order,
/// on the writing thread. Followers include the holders derived from this one, so a `set` returns
/// once the whole dependent graph is up to date.
///
/// Cloning a holder clones the handle, not the value.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct Holder<T> {
    pub(crate) inner: Arc<HolderInner<T>>,
}

/// Configures a [Holder] before it is shared.
pub struct HolderBuilder<T> {
    name: Option<Cow<'static, str>>,
    initial: Option<T>,
    validator: Option<Validator<T>>,
}

type Validator<T> = fn(&T) -> bool;

/// Hook run after followers when a whole value is replaced. Collections use it to turn a bulk
/// `set` into an incremental event.
pub(crate) trait ReplaceSink<T>: Send + Sync {
    /// Called before the value is stored. The returned hook runs after followers, and only reaches
    /// the listeners registered at this point: later ones are replayed the new value instead.
    fn prepare(&self) -> Option<ReplaceHook<T>>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub(crate) type ReplaceHook<T> = Box<dyn FnOnce(Option<&T>, &T)>;

pub(crate) struct HolderInner<T> {
    id: HolderId,
    name: Option<Cow<'static, str>>,
    validator: Option<Validator<T>>,
    /// Held while a value is published or a follower registered, so registration and replay never
    /// interleave with a publish. Reentrant so followers may follow, read or set this holder.
    notify: ReentrantMutex<()>,
    state: Mutex<State<T>>,
    /// Opens once, on first value.
    arrived: Condvar,
    /// The holders this one is computed from. Sources are kept alive by their derived holders,
    /// never the other way around.
    upstream: Mutex<Vec<Arc<dyn Any + Send + Sync>>>,
    self_hold: Mutex<SelfHold<T>>,
    memo: Mutex<HashMap<&'static str, MemoRef>>,
    sink: OnceLock<Arc<dyn ReplaceSink<T>>>,
}

struct State<T> {
    value: Option<Arc<T>>,
    followers: FollowerTable<T>,
}

/// A derived holder followed without anchors keeps itself alive until those followers are removed.
struct SelfHold<T> {
    count: usize,
    this: Option<Arc<HolderInner<T>>>,
}

enum MemoRef {
    Weak(Weak<dyn Any + Send + Sync>),
    Strong(Arc<dyn Any + Send + Sync>),
}

impl<T: Holdable> HolderInner<T> {
    fn new(name: Option<Cow<'static, str>>, validator: Option<Validator<T>>) -> Self {
        HolderInner {
            id: HolderId::next(),
            name,
            validator,
            notify: ReentrantMutex::new(()),
            state: Mutex::new(State {
                value: None,
                followers: FollowerTable::new(),
            }),
            arrived: Condvar::new(),
            upstream: Mutex::new(Vec::new()),
            self_hold: Mutex::new(SelfHold { count: 0, this: None }),
            memo: Mutex::new(HashMap::new()),
            sink: OnceLock::new(),
        }
    }

    pub(crate) fn label(&self) -> String {
        match &self.name {
            None => self.id.to_string(),
            Some(name) => format!("{}({})", self.id, name),
        }
    }

    /// Runs `f` with the notify lock held: nothing is published to, or registered on, this holder
    /// by another thread meanwhile.
    pub(crate) fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _notifying = self.notify.lock();
        f()
    }

    /// Stores a value and notifies followers, then the replace hook if any.
    pub(crate) fn publish(&self, value: T) {
        let _notifying = self.notify.lock();
        let replaced = self.sink.get().and_then(|sink| sink.prepare());
        self.commit(value, |previous, current| {
            if let Some(replaced) = replaced {
                replaced(previous, current);
            }
        });
    }

    /// Stores a value and notifies followers, then runs `after` with the previous and new value,
    /// all inside the notify lock.
    ///
    /// A follower may set this holder again: the remaining followers then already got the newer
    /// value from that nested publish, and are skipped here.
    pub(crate) fn commit(&self, value: T, after: impl FnOnce(Option<&T>, &T)) {
        let _notifying = self.notify.lock();
        let (previous, current, callbacks) = {
            let mut state = self.state.lock();
            let pruned = state.followers.sweep();
            if pruned > 0 {
                debug!("holder {} pruned {} unreachable follower(s)", self.label(), pruned);
            }
            let current = Arc::new(value);
            let previous = state.value.replace(current.clone());
            (previous, current, state.followers.snapshot())
        };
        self.arrived.notify_all();
        trace!("holder {} notifies {} follower(s)", self.label(), callbacks.len());
        for callback in callbacks {
            if !self.is_latest(&current) {
                trace!("holder {} was set again by a follower, stopping", self.label());
                break;
            }
            callback(&*current);
        }
        after(previous.as_deref(), &*current);
    }

    /// Registers a follower and replays the current value to it, if any, as one atomic step.
    pub(crate) fn follow(&self, callback: Callback<T>, keep_alive: KeepAlive) -> FollowerId {
        let _notifying = self.notify.lock();
        let (id, current) = {
            let mut state = self.state.lock();
            let id = state.followers.insert(callback.clone(), keep_alive);
            (id, state.value.clone())
        };
        trace!("holder {} gained follower {:?}", self.label(), id);
        if let Some(current) = current {
            callback(&*current);
        }
        id
    }

    pub(crate) fn unfollow(&self, id: FollowerId) -> Option<KeepAlive> {
        let _notifying = self.notify.lock();
        self.state.lock().followers.remove(id)
    }

    /// Blocks until the first value arrived.
    pub(crate) fn wait(&self) -> Arc<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(value) = &state.value {
                return value.clone();
            }
            self.arrived.wait(&mut state);
        }
    }

    pub(crate) fn wait_for(&self, timeout: Duration) -> Option<Arc<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(value) = &state.value {
                return Some(value.clone());
            }
            if self.arrived.wait_until(&mut state, deadline).timed_out() {
                return state.value.clone();
            }
        }
    }

    fn is_latest(&self, value: &Arc<T>) -> bool {
        self.state.lock().value.as_ref().is_some_and(|latest| Arc::ptr_eq(latest, value))
    }

    pub(crate) fn latest(&self) -> Option<Arc<T>> {
        self.state.lock().value.clone()
    }

    pub(crate) fn add_upstream(&self, source: Arc<dyn Any + Send + Sync>) {
        self.upstream.lock().push(source);
    }

    fn is_derived(&self) -> bool {
        !self.upstream.lock().is_empty()
    }

    /// Counts an unanchored follower; a derived holder then keeps itself alive.
    pub(crate) fn retain_self(self: &Arc<Self>) {
        if !self.is_derived() {
            return;
        }
        let mut hold = self.self_hold.lock();
        hold.count += 1;
        if hold.this.is_none() {
            debug!("holder {} is followed without anchor, keeping it alive", self.label());
            hold.this = Some(self.clone());
        }
    }

    pub(crate) fn release_self(&self) {
        let released = {
            let mut hold = self.self_hold.lock();
            hold.count = hold.count.saturating_sub(1);
            if hold.count == 0 {
                hold.this.take()
            } else {
                None
            }
        };
        if released.is_some() {
            debug!("holder {} lost its last unanchored follower", self.label());
        }
    }

    pub(crate) fn install_sink(&self, sink: Arc<dyn ReplaceSink<T>>) -> &Arc<dyn ReplaceSink<T>> {
        self.sink.get_or_init(|| sink)
    }
}

impl<T: Holdable> Holder<T> {
    /// Creates an empty holder: readers block and followers wait until the first `set`.
    pub fn new() -> Self {
        Holder::from_inner(Arc::new(HolderInner::new(None, None)))
    }

    /// Creates a holder which already holds `value`.
    pub fn with_value(value: T) -> Self {
        let holder = Holder::new();
        holder.inner.publish(value);
        holder
    }

    pub fn builder() -> HolderBuilder<T> {
        HolderBuilder {
            name: None,
            initial: None,
            validator: None,
        }
    }

    pub(crate) fn from_inner(inner: Arc<HolderInner<T>>) -> Self {
        Holder { inner }
    }

    pub fn id(&self) -> HolderId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Returns the latest value, blocking until the first one arrived.
    ///
    /// Only call this on a holder known to eventually receive a value: there is no cancellation,
    /// a holder which is never set blocks the caller forever. See [Holder::get_timeout] and
    /// [Holder::try_get] otherwise.
    pub fn get(&self) -> T {
        (*self.inner.wait()).clone()
    }

    /// Returns the latest value, or `None` if none ever arrived. Never blocks on the latch.
    pub fn try_get(&self) -> Option<T> {
        self.inner.latest().map(|value| (*value).clone())
    }

    /// Like [Holder::get], giving up after `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        match self.inner.wait_for(timeout) {
            Some(value) => Ok((*value).clone()),
            None => Err(HolderError::Timeout {
                holder: self.id(),
                waited: timeout,
            }),
        }
    }

    /// Blocks until the first value arrived, then runs `f` on the latest value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.inner.wait())
    }

    pub fn generation(&self) -> Generation {
        if self.inner.latest().is_some() {
            Generation::Present
        } else {
            Generation::Absent
        }
    }

    pub fn has_value(&self) -> bool {
        self.generation() == Generation::Present
    }

    /// Stores `value`, then calls every follower with it, in registration order, on this thread.
    ///
    /// Fails with [HolderError::InvalidValue] if this is a not-null holder and the value is absent;
    /// nothing is stored nor notified then.
    ///
    /// A follower may set the holder it follows. Followers after it then only see the newer value.
    /// Incremental followers of a collection still get both changes, the nested one first, so a
    /// collection should not be edited from its own followers.
    pub fn set(&self, value: T) -> Result<()> {
        if let Some(validator) = self.inner.validator {
            if !validator(&value) {
                warn!("holder {} rejected an absent value", self.inner.label());
                return Err(HolderError::InvalidValue { holder: self.id() });
            }
        }
        self.inner.publish(value);
        Ok(())
    }

    /// Publishes a computed value. Derived holders never validate.
    pub(crate) fn emit(&self, value: T) {
        self.inner.publish(value);
    }

    /// Calls `f` with the current value now, if there is one, and with every later value.
    ///
    /// The follower is kept until [Holder::unfollow]. If this holder is derived, it stays alive and
    /// wired to its sources as long as the follower is registered, even with no other handle on it.
    pub fn follow(&self, f: impl Fn(&T) + Send + Sync + 'static) -> FollowerId {
        let id = self.inner.follow(Arc::new(f), KeepAlive::Always);
        self.inner.retain_self();
        id
    }

    /// Like [Holder::follow], but the follower is dropped once every anchor is gone.
    ///
    /// With no anchors this is the same as [Holder::follow].
    pub fn follow_while(&self, f: impl Fn(&T) + Send + Sync + 'static, anchors: impl IntoIterator<Item = Anchor>) -> FollowerId {
        let keep_alive = KeepAlive::from_anchors(anchors.into_iter().collect());
        let always = keep_alive.is_always();
        let id = self.inner.follow(Arc::new(f), keep_alive);
        if always {
            self.inner.retain_self();
        }
        id
    }

    /// Removes a follower. Returns `false` if it was not registered (anymore).
    pub fn unfollow(&self, id: FollowerId) -> bool {
        match self.inner.unfollow(id) {
            None => false,
            Some(keep_alive) => {
                if keep_alive.is_always() {
                    self.inner.release_self();
                }
                true
            }
        }
    }

    /// Follows with `f` and returns this holder, for chaining.
    pub fn peek(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.follow(f);
        self.clone()
    }

    /// Number of registered followers, including those not yet pruned.
    pub fn followers(&self) -> usize {
        self.inner.state.lock().followers.len()
    }

    /// A weak handle which is alive as long as this holder is.
    pub fn anchor(&self) -> Anchor {
        Anchor::of(&self.inner)
    }

    /// Whether both handles point to the same holder.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Returns the holder cached under `key` in this one, building it if there is none alive.
    ///
    /// The cache holds it weakly: it lives as long as someone else holds it.
    pub(crate) fn memo<U: Holdable>(&self, key: &'static str, build: impl FnOnce() -> Holder<U>) -> Holder<U> {
        if let Some(cached) = self.cached::<U>(key) {
            return cached;
        }
        let built = build();
        let mut memo = self.inner.memo.lock();
        if let Some(cached) = memo.get(key).and_then(MemoRef::upgrade).and_then(|any| any.downcast::<HolderInner<U>>().ok()) {
            return Holder::from_inner(cached);
        }
        let weak: Weak<HolderInner<U>> = Arc::downgrade(&built.inner);
        memo.insert(key, MemoRef::Weak(weak));
        built
    }

    /// Caches `target` under `key` with a strong reference. Only for holders this one already
    /// keeps alive as a source, or it would never be freed.
    pub(crate) fn memo_link<U: Holdable>(&self, key: &'static str, target: &Holder<U>) {
        let strong: Arc<dyn Any + Send + Sync> = target.inner.clone();
        self.inner.memo.lock().insert(key, MemoRef::Strong(strong));
    }

    fn cached<U: Holdable>(&self, key: &'static str) -> Option<Holder<U>> {
        let any = self.inner.memo.lock().get(key).and_then(MemoRef::upgrade)?;
        any.downcast::<HolderInner<U>>().ok().map(Holder::from_inner)
    }
}

impl<T: Holdable + Absent> Holder<T> {
    /// Creates an empty holder which refuses absent values.
    pub fn not_null() -> Self {
        Holder::from_inner(Arc::new(HolderInner::new(None, Some(is_present::<T>))))
    }
}

fn is_present<T: Absent>(value: &T) -> bool {
    !value.is_absent()
}

impl MemoRef {
    fn upgrade(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        match self {
            MemoRef::Weak(weak) => weak.upgrade(),
            MemoRef::Strong(strong) => Some(strong.clone()),
        }
    }
}

impl<T: Holdable> HolderBuilder<T> {
    /// Name used in log messages.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn initial(mut self, value: T) -> Self {
        self.initial = Some(value);
        self
    }

    /// Fails if the initial value is refused by the holder.
    pub fn build(self) -> Result<Holder<T>> {
        let holder = Holder::from_inner(Arc::new(HolderInner::new(self.name, self.validator)));
        if let Some(initial) = self.initial {
            holder.set(initial)?;
        }
        Ok(holder)
    }
}

impl<T: Holdable + Absent> HolderBuilder<T> {
    /// Refuse absent values with [HolderError::InvalidValue].
    pub fn not_null(mut self) -> Self {
        self.validator = Some(is_present::<T>);
        self
    }
}

impl<T: Holdable> Default for Holder<T> {
    fn default() -> Self {
        Holder::new()
    }
}

impl<T: Holdable> Publish<T> for Holder<T> {
    fn publish(&self, value: T) -> Result<()> {
        self.set(value)
    }
}

impl<T: Holdable + Debug> Debug for Holder<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Holder")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("value", &self.inner.latest())
            .finish_non_exhaustive()
    }
}
