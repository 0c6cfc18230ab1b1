/// Inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn width(&self) -> u64 {
        self.to - self.from + 1
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// First block to scan for a contract.
///
/// Resumes after the stored cursor; without one, starts at `configured_start` (or
/// genesis). Never earlier than the contract's deployment.
pub fn start_block(cursor: Option<u64>, deploy_block: u64, configured_start: Option<u64>) -> u64 {
    let resume = match cursor {
        Some(last) => last.saturating_add(1),
        None => configured_start.unwrap_or(0),
    };
    resume.max(deploy_block)
}

/// Split `[from, to]` into consecutive sub-ranges no wider than `max_span`.
///
/// Yields `ceil((to - from + 1) / max_span)` ranges with no gaps or overlaps, and
/// nothing when `from > to`. Each range holds at most `max_span` blocks, one fewer
/// than the client's block-difference limit admits.
pub fn chunk_range(from: u64, to: u64, max_span: u64) -> Chunks {
    Chunks {
        next: from,
        end: to,
        span: max_span.max(1),
        done: from > to,
    }
}

#[derive(Debug, Clone)]
pub struct Chunks {
    next: u64,
    end: u64,
    span: u64,
    done: bool,
}

impl Iterator for Chunks {
    type Item = BlockRange;

    fn next(&mut self) -> Option<BlockRange> {
        if self.done {
            return None;
        }
        let to = self.next.saturating_add(self.span - 1).min(self.end);
        let range = BlockRange {
            from: self.next,
            to,
        };
        if to == self.end {
            self.done = true;
        } else {
            self.next = to + 1;
        }
        Some(range)
    }
}
