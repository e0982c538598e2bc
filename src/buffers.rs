/// Two equally sized buffers with swappable roles.
///
/// The front buffer holds the current permutation; the back buffer is
/// scratch and is overwritten in full by the next pass.
#[derive(Debug)]
pub struct BufferPair<B> {
    slots: [B; 2],
    front: usize,
}

impl<B> BufferPair<B> {
    pub fn new(front: B, back: B) -> Self {
        Self {
            slots: [front, back],
            front: 0,
        }
    }

    pub fn front(&self) -> &B {
        &self.slots[self.front]
    }

    /// Borrows the front for reading and the back for writing.
    pub fn split(&mut self) -> (&B, &mut B) {
        let (first, second) = self.slots.split_at_mut(1);
        if self.front == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    pub fn swap(&mut self) {
        self.front ^= 1;
    }
}
