use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
};

// TbObj lets tasks mutably share testbench objects (scoreboard, coverage, ...). The
// simulation runs on a single thread, so Rc and RefCell are enough.
pub struct TbObj<T>(Rc<RefCell<T>>);

impl<T> TbObj<T> {
    pub fn new(data: T) -> TbObj<T> {
        TbObj(Rc::new(RefCell::new(data)))
    }
    pub fn get(&self) -> Ref<'_, T> {
        (*self.0).borrow()
    }
    pub fn get_mut(&self) -> RefMut<'_, T> {
        (*self.0).borrow_mut()
    }
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.get_mut())
    }
}

impl<T> Clone for TbObj<T> {
    fn clone(&self) -> Self {
        TbObj(self.0.clone())
    }
}

impl<T: Default> Default for TbObj<T> {
    fn default() -> Self {
        TbObj::new(T::default())
    }
}
