/// The link slot of an arena entry.
///
/// Each entry of an arena carries exactly one `Link`. Consequently, an entry can be a member of
/// at most one [`IndexList`] threaded through that arena at any point in time.
///
/// [`IndexList`]: struct.IndexList.html
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Link {
    next: Option<usize>,
    linked: bool,
}

/// A singly linked list threaded through the links of an arena.
///
/// The list only stores its head, the links themselves are owned by the caller and passed to each
/// operation. This keeps the arena a plain slice and allows several lists (e.g. a free list and a
/// list of wildcard bound entries) to share it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IndexList {
    head: Option<usize>,
    len: usize,
}

/// Iterates over the indices of a list, from head to tail.
pub struct Iter<'a> {
    links: &'a [Link],
    next: Option<usize>,
}

impl Link {
    /// Query whether the entry is currently a member of some list.
    pub fn is_linked(&self) -> bool {
        self.linked
    }
}

impl IndexList {
    /// Create an empty list.
    pub const fn new() -> Self {
        IndexList { head: None, len: 0 }
    }

    /// The number of entries in the list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Query whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Push an entry to the front of the list.
    ///
    /// # Panics
    /// This function panics if the entry is already linked into a list, which would corrupt both.
    pub fn push(&mut self, links: &mut [Link], idx: usize) {
        let link = &mut links[idx];
        assert!(!link.linked, "entry {} linked twice", idx);
        link.next = self.head;
        link.linked = true;
        self.head = Some(idx);
        self.len += 1;
    }

    /// Take the entry at the front of the list.
    pub fn pop(&mut self, links: &mut [Link]) -> Option<usize> {
        let idx = self.head?;
        let link = &mut links[idx];
        self.head = link.next.take();
        link.linked = false;
        self.len -= 1;
        Some(idx)
    }

    /// Unlink a specific entry.
    ///
    /// Returns `false` if the entry was not a member of this list.
    pub fn remove(&mut self, links: &mut [Link], idx: usize) -> bool {
        let mut prev: Option<usize> = None;
        let mut cursor = self.head;

        while let Some(current) = cursor {
            if current == idx {
                let next = links[current].next.take();
                match prev {
                    None => self.head = next,
                    Some(prev) => links[prev].next = next,
                }
                links[current].linked = false;
                self.len -= 1;
                return true;
            }
            prev = Some(current);
            cursor = links[current].next;
        }

        false
    }

    /// Query whether an entry is a member of this list.
    pub fn contains(&self, links: &[Link], idx: usize) -> bool {
        self.iter(links).any(|member| member == idx)
    }

    /// Iterate over the members, starting at the head.
    pub fn iter<'a>(&self, links: &'a [Link]) -> Iter<'a> {
        Iter { links, next: self.head }
    }
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.next?;
        self.next = self.links[current].next;
        Some(current)
    }
}
