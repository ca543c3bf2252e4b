//! Concurrency strategy for trees.
//!
//! A tree's state lives in a cell chosen once, by type, at construction:
//!
//! * [`Unguarded`] stores it in a [`RefCell`].  There is no lock; the tree is
//!   `Send` but not `Sync`, so the compiler makes the caller serialize access.
//! * [`Guarded`] stores it in a [`parking_lot::RwLock`].  Reads (including
//!   whole iterations) take the shared lock, mutations take the exclusive one.
//!
//! The tree code reaches its state only through [`Guard::read`],
//! [`Guard::write`] and [`Guard::write_with`], so it never branches on the
//! mode.

use std::cell::RefCell;

/// A cell that hands out shared or exclusive access to its contents.
pub trait Guard<T> {
    /// Wraps `value`.
    fn new(value: T) -> Self;

    /// Runs `f` with shared access for its full duration.
    fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R;

    /// Runs `f` with exclusive access for its full duration.
    fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;

    /// Exclusive access for an update whose payload comes from `make`.
    ///
    /// `check` sees the contents first; a `Some` result is returned and
    /// `make` never runs.  Otherwise `apply` receives what `make` produced.
    /// A lock is held from `check` through `apply`.  A `RefCell` is released
    /// while `make` runs, so `make` may use the cell and `apply` must look
    /// again.
    fn write_with<A, P, R>(
        &self,
        arg: A,
        check: impl FnOnce(&T, &A) -> Option<R>,
        make: impl FnOnce() -> P,
        apply: impl FnOnce(&mut T, A, P) -> R,
    ) -> R;

    /// Exclusive access through a unique borrow; never blocks.
    fn get_mut(&mut self) -> &mut T;

    /// Unwraps the contents.
    fn into_inner(self) -> T;
}

impl<T> Guard<T> for RefCell<T> {
    fn new(value: T) -> Self {
        RefCell::new(value)
    }

    fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.borrow())
    }

    fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.borrow_mut())
    }

    fn write_with<A, P, R>(
        &self,
        arg: A,
        check: impl FnOnce(&T, &A) -> Option<R>,
        make: impl FnOnce() -> P,
        apply: impl FnOnce(&mut T, A, P) -> R,
    ) -> R {
        let hit = check(&self.borrow(), &arg);
        if let Some(r) = hit {
            return r;
        }
        let p = make();
        apply(&mut self.borrow_mut(), arg, p)
    }

    fn get_mut(&mut self) -> &mut T {
        RefCell::get_mut(self)
    }

    fn into_inner(self) -> T {
        RefCell::into_inner(self)
    }
}

impl<T> Guard<T> for parking_lot::RwLock<T> {
    fn new(value: T) -> Self {
        parking_lot::RwLock::new(value)
    }

    fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&parking_lot::RwLock::read(self))
    }

    fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut parking_lot::RwLock::write(self))
    }

    fn write_with<A, P, R>(
        &self,
        arg: A,
        check: impl FnOnce(&T, &A) -> Option<R>,
        make: impl FnOnce() -> P,
        apply: impl FnOnce(&mut T, A, P) -> R,
    ) -> R {
        let mut g = parking_lot::RwLock::write(self);
        if let Some(r) = check(&g, &arg) {
            return r;
        }
        let p = make();
        apply(&mut g, arg, p)
    }

    fn get_mut(&mut self) -> &mut T {
        parking_lot::RwLock::get_mut(self)
    }

    fn into_inner(self) -> T {
        parking_lot::RwLock::into_inner(self)
    }
}

mod private {
    pub trait Sealed {}
}

/// Selects the cell that guards a tree's state.
pub trait Mode: private::Sealed + 'static {
    /// The cell holding a tree's state in this mode.
    type Cell<T>: Guard<T>;

    /// Whether the mode locks (the "safe" configuration).
    const SAFE: bool;
}

/// No locking.  The caller is responsible for serializing access, which the
/// type system enforces by making the tree `!Sync`.
#[derive(Debug, Clone, Copy)]
pub enum Unguarded {}

/// Reader/writer locking around every public operation.
#[derive(Debug, Clone, Copy)]
pub enum Guarded {}

impl private::Sealed for Unguarded {}
impl private::Sealed for Guarded {}

impl Mode for Unguarded {
    type Cell<T> = RefCell<T>;
    const SAFE: bool = false;
}

impl Mode for Guarded {
    type Cell<T> = parking_lot::RwLock<T>;
    const SAFE: bool = true;
}
