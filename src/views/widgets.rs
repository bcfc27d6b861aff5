use ratatui::widgets::ListState;

pub struct StatefulList<T> {
    pub state: ListState,
    pub items: Vec<T>,
}

impl<T> StatefulList<T> {
    pub fn with_items(items: Vec<T>) -> StatefulList<T> {
        let mut state = ListState::default();
        // Start with the first item selected
        if !items.is_empty() {
            state.select(Some(0));
        }
        StatefulList {
            state,
            items,
        }
    }

    /// Swaps in new items, keeping the selection on the item with the same
    /// key when it is still present.
    pub fn replace_items<K, F>(&mut self, items: Vec<T>, key: F)
        where
            F: Fn(&T) -> K,
            K: PartialEq,
    {
        let selected = self.selected().map(&key);
        self.items = items;
        let index = selected
            .and_then(|k| self.items.iter().position(|item| key(item) == k))
            .or(if self.items.is_empty() { None } else { Some(0) });
        self.state.select(index);
    }

    pub fn selected(&self) -> Option<&T> {
        self.state.selected().and_then(|i| self.items.get(i))
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.state.selected()
    }

    pub fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i >= self.items.len() - 1 {
                    i
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => i.saturating_sub(1),
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn first(&mut self) {
        if !self.items.is_empty() {
            self.state.select(Some(0));
        }
    }

    pub fn last(&mut self) {
        if !self.items.is_empty() {
            self.state.select(Some(self.items.len() - 1));
        }
    }

    pub fn jump_up(&mut self, offset: usize) {
        if let Some(i) = self.state.selected() {
            self.state.select(Some(i.saturating_sub(offset)));
        }
    }

    pub fn jump_down(&mut self, offset: usize) {
        if self.items.is_empty() {
            return;
        }
        let i = self.state.selected().map_or(0, |i| (i + offset).min(self.items.len() - 1));
        self.state.select(Some(i));
    }
}
