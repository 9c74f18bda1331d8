use std::cmp::Reverse;
use std::collections::HashSet;

use instant::{Duration, Instant};
use log::debug;
use smallvec::{smallvec, SmallVec};

/// The expected maximum number of slot markers appearing in a grid.
pub const MAX_SLOT_COUNT: usize = 64;

/// The expected maximum length for a single word.
pub const MAX_WORD_LENGTH: usize = 21;

/// Direction that a word is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Horizontal,
    Vertical,
}

/// A single cell of the puzzle grid.
///
/// A `Marker` cell records how many words start at its coordinate. Once a
/// word is placed through it, the cell holds that word's letter; undoing the
/// placement restores the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Blocked,
    Empty,
    Marker(u8),
    Letter(char),
}

impl Cell {
    fn from_char(ch: char) -> Option<Cell> {
        match ch {
            '.' => Some(Cell::Blocked),
            '0' => Some(Cell::Empty),
            '1'..='9' => Some(Cell::Marker(ch as u8 - b'0')),
            ch if ch.is_alphabetic() => Some(Cell::Letter(ch)),
            _ => None,
        }
    }

    fn to_char(self) -> char {
        match self {
            Cell::Blocked => '.',
            Cell::Empty => '0',
            Cell::Marker(count) => (b'0' + count) as char,
            Cell::Letter(ch) => ch,
        }
    }
}

/// Everything that can make a solve attempt fail. All variants terminate the
/// attempt immediately; the caller never sees a partially filled grid.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum SolveError {
    #[display("puzzle text is empty or contains an unrecognized symbol")]
    MalformedPuzzle,
    #[display("word list is empty or contains an empty word")]
    MalformedWordList,
    #[display("grid requires {expected} words but {supplied} were supplied")]
    SlotCountMismatch { expected: usize, supplied: usize },
    #[display("word list contains \"{word}\" more than once")]
    DuplicateWord { word: String },
    #[display("no assignment of words to slots satisfies the grid")]
    Unsatisfiable,
    #[display("more than one assignment of words to slots satisfies the grid")]
    AmbiguousSolution,
}

/// A word from the input list, with its characters pre-split for cell-by-cell
/// comparison against the grid.
#[derive(Debug, Clone)]
pub struct Word {
    pub text: String,
    pub glyphs: SmallVec<[char; MAX_WORD_LENGTH]>,
}

impl Word {
    fn new(text: &str) -> Word {
        Word {
            text: text.to_string(),
            glyphs: text.chars().collect(),
        }
    }
}

/// The puzzle as a mutable matrix of cells. Rows may have different lengths;
/// bounds checks always use each row's own length.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    /// Parse puzzle text into a grid. The text is trimmed as a whole and each
    /// line is trimmed individually; every remaining character must be `.`,
    /// a digit, or a letter.
    pub fn parse(text: &str) -> Result<Grid, SolveError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SolveError::MalformedPuzzle);
        }

        let mut rows = Vec::new();
        for line in trimmed.split('\n') {
            let line = line.trim();
            let mut cells = Vec::with_capacity(line.len());
            for ch in line.chars() {
                cells.push(Cell::from_char(ch).ok_or(SolveError::MalformedPuzzle)?);
            }
            rows.push(cells);
        }

        Ok(Grid { rows })
    }

    pub fn get(&self, row: usize, col: usize) -> Cell {
        self.rows[row][col]
    }

    pub fn set(&mut self, row: usize, col: usize, cell: Cell) {
        self.rows[row][col] = cell;
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn row_len(&self, row: usize) -> usize {
        self.rows[row].len()
    }

    /// Render the grid as newline-joined rows.
    pub fn render(&self) -> String {
        self.rows
            .iter()
            .map(|row| row.iter().map(|&cell| cell.to_char()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// A key uniquely determined by the current cell contents. Two grids have
    /// equal fingerprints exactly when their contents are equal, which is
    /// what makes the memo set sound.
    pub fn fingerprint(&self) -> String {
        self.render()
    }
}

/// A coordinate where one or more words must start, produced once by
/// `find_slots` and never mutated.
#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub row: usize,
    pub col: usize,
    pub count: u8,
}

/// Scan the grid in row-major order and collect every slot marker. The
/// resulting order is significant: the search tries slots exactly in this
/// order, which keeps the engine deterministic.
pub fn find_slots(grid: &Grid) -> SmallVec<[Slot; MAX_SLOT_COUNT]> {
    let mut slots: SmallVec<[Slot; MAX_SLOT_COUNT]> = smallvec![];

    for row in 0..grid.height() {
        for col in 0..grid.row_len(row) {
            if let Cell::Marker(count) = grid.get(row, col) {
                slots.push(Slot { row, col, count });
            }
        }
    }

    slots
}

fn offset_cell(row: usize, col: usize, direction: Direction, offset: usize) -> (usize, usize) {
    match direction {
        Direction::Horizontal => (row, col + offset),
        Direction::Vertical => (row + offset, col),
    }
}

/// Check whether `word` fits at (row, col) in the given direction: every cell
/// it would occupy must exist in its own row, must not be blocked, and must
/// be either unfilled (empty or marker) or already hold the same letter.
/// This is the sole intersection-consistency check in the engine.
pub fn can_place(grid: &Grid, word: &Word, row: usize, col: usize, direction: Direction) -> bool {
    match direction {
        Direction::Horizontal => {
            if row >= grid.height() || col + word.glyphs.len() > grid.row_len(row) {
                return false;
            }
        }
        Direction::Vertical => {
            if row + word.glyphs.len() > grid.height() {
                return false;
            }
        }
    }

    for (offset, &glyph) in word.glyphs.iter().enumerate() {
        let (r, c) = offset_cell(row, col, direction, offset);
        if c >= grid.row_len(r) {
            return false;
        }
        match grid.get(r, c) {
            Cell::Blocked => return false,
            Cell::Letter(existing) if existing != glyph => return false,
            _ => {}
        }
    }

    true
}

/// A committed-unless-dropped word placement. `open` validates the placement,
/// snapshots the cells it overwrites, and writes the word's letters; dropping
/// the guard restores the snapshot, so the undo happens on every exit path.
/// `commit` keeps the letters in the grid.
pub struct Placement<'a> {
    grid: &'a mut Grid,
    row: usize,
    col: usize,
    direction: Direction,
    saved: SmallVec<[Cell; MAX_WORD_LENGTH]>,
    committed: bool,
}

impl<'a> Placement<'a> {
    /// Try to place `word` starting at (row, col). Returns `None` without
    /// touching the grid if the placement is invalid.
    pub fn open(
        grid: &'a mut Grid,
        word: &Word,
        row: usize,
        col: usize,
        direction: Direction,
    ) -> Option<Placement<'a>> {
        if !can_place(grid, word, row, col, direction) {
            return None;
        }

        let mut saved: SmallVec<[Cell; MAX_WORD_LENGTH]> = smallvec![];
        for (offset, &glyph) in word.glyphs.iter().enumerate() {
            let (r, c) = offset_cell(row, col, direction, offset);
            saved.push(grid.get(r, c));
            grid.set(r, c, Cell::Letter(glyph));
        }

        Some(Placement {
            grid,
            row,
            col,
            direction,
            saved,
            committed: false,
        })
    }

    pub fn grid(&mut self) -> &mut Grid {
        &mut *self.grid
    }

    /// Keep the placed letters; the guard will not revert them on drop.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Placement<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for (offset, &cell) in self.saved.iter().enumerate() {
            let (r, c) = offset_cell(self.row, self.col, self.direction, offset);
            self.grid.set(r, c, cell);
        }
    }
}

/// Knobs for the search engine. The defaults match the behavior of the
/// original solver: stop at the first complete assignment, memoize failed
/// grid states, and place longer words first.
#[derive(Debug, Clone, Copy)]
pub struct SolverOptions {
    /// Keep searching after the first complete assignment and fail with
    /// `AmbiguousSolution` unless exactly one exists.
    pub require_unique: bool,
    /// Record failed grid states so identical states are not re-explored.
    pub use_memo: bool,
    /// Sort the word list by descending length before searching. Longer words
    /// are more constrained, so placing them first prunes the tree earlier.
    pub sort_words: bool,
}

impl Default for SolverOptions {
    fn default() -> SolverOptions {
        SolverOptions {
            require_unique: false,
            use_memo: true,
            sort_words: true,
        }
    }
}

/// A struct tracking statistics about a single solve call.
#[derive(Debug, Clone)]
pub struct Statistics {
    pub states: u64,
    pub backtracks: u64,
    pub memo_hits: u64,
    pub solutions: u32,
    pub duration: Duration,
}

/// Per-call search state. Nothing in here outlives one solve call, so
/// independent solves can never leak state into each other.
struct SearchContext {
    memo: HashSet<(String, usize)>,
    statistics: Statistics,
    first_solution: Option<String>,
    use_memo: bool,
    solution_limit: u32,
}

impl SearchContext {
    fn new(options: &SolverOptions) -> SearchContext {
        SearchContext {
            memo: HashSet::new(),
            statistics: Statistics {
                states: 0,
                backtracks: 0,
                memo_hits: 0,
                solutions: 0,
                duration: Duration::from_millis(0),
            },
            first_solution: None,
            use_memo: options.use_memo,
            solution_limit: if options.require_unique { 2 } else { 1 },
        }
    }
}

/// Assign the word at `index` and recurse, returning the number of complete
/// assignments found in this subtree (capped at the context's solution
/// limit). In first-solution mode the winning branch is committed on the way
/// out so the live grid reflects the placed words; in uniqueness mode every
/// placement is reverted and the first accepted grid is captured by
/// rendering it at the accept leaf.
fn backtrack(
    grid: &mut Grid,
    words: &[Word],
    slots: &[Slot],
    index: usize,
    ctx: &mut SearchContext,
) -> u32 {
    if index == words.len() {
        ctx.statistics.solutions += 1;
        if ctx.first_solution.is_none() {
            ctx.first_solution = Some(grid.render());
        }
        return 1;
    }

    ctx.statistics.states += 1;

    // The memo key pairs the grid contents with the word index. The index
    // pins down the multiset of words still to be placed (the word order is
    // fixed for the whole call), so a state that failed here can safely be
    // skipped when reached again.
    let memo_key = if ctx.use_memo {
        let key = (grid.fingerprint(), index);
        if ctx.memo.contains(&key) {
            ctx.statistics.memo_hits += 1;
            debug!("skipping previously explored grid state at word index {index}");
            return 0;
        }
        Some(key)
    } else {
        None
    };

    let word = &words[index];
    let mut found = 0;

    'slots: for slot in slots {
        if slot.count == 0 {
            continue;
        }

        for direction in [Direction::Horizontal, Direction::Vertical] {
            let mut placement = match Placement::open(grid, word, slot.row, slot.col, direction) {
                Some(placement) => placement,
                None => continue,
            };

            found += backtrack(placement.grid(), words, slots, index + 1, ctx);

            if found >= ctx.solution_limit {
                if ctx.solution_limit == 1 {
                    placement.commit();
                }
                break 'slots;
            }

            ctx.statistics.backtracks += 1;
        }
    }

    // Only subtrees that were searched to exhaustion without an accept may be
    // memoized; a subtree cut short by the solution limit always has
    // found > 0, so it can never be recorded here.
    if found == 0 {
        if let Some(key) = memo_key {
            ctx.memo.insert(key);
        }
    }

    found
}

/// The result of a successful solve.
#[derive(Debug)]
pub struct SolveSuccess {
    pub grid: String,
    pub statistics: Statistics,
}

/// Solve the puzzle with the given options.
///
/// The puzzle text is parsed into a grid, the input is validated (non-empty
/// word list with no empty words, slot counts matching the word count, no
/// duplicates), and the backtracking search is run over the extracted slots.
pub fn solve_puzzle(
    puzzle: &str,
    words: &[&str],
    options: &SolverOptions,
) -> Result<SolveSuccess, SolveError> {
    let start = Instant::now();

    let mut grid = Grid::parse(puzzle)?;

    if words.is_empty() || words.iter().any(|word| word.is_empty()) {
        return Err(SolveError::MalformedWordList);
    }

    let slots = find_slots(&grid);

    let expected: usize = slots.iter().map(|slot| slot.count as usize).sum();
    if expected != words.len() {
        return Err(SolveError::SlotCountMismatch {
            expected,
            supplied: words.len(),
        });
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(words.len());
    for &word in words {
        if !seen.insert(word) {
            return Err(SolveError::DuplicateWord {
                word: word.to_string(),
            });
        }
    }

    let mut word_list: Vec<Word> = words.iter().map(|&word| Word::new(word)).collect();
    if options.sort_words {
        // Stable sort, so words of equal length keep their supplied order.
        word_list.sort_by_key(|word| Reverse(word.glyphs.len()));
    }

    let mut ctx = SearchContext::new(options);
    let total = backtrack(&mut grid, &word_list, &slots, 0, &mut ctx);
    ctx.statistics.duration = start.elapsed();

    debug!("search finished: {:?}", ctx.statistics);

    match ctx.first_solution {
        Some(text) if total == 1 => Ok(SolveSuccess {
            grid: text,
            statistics: ctx.statistics,
        }),
        Some(_) => Err(SolveError::AmbiguousSolution),
        None => Err(SolveError::Unsatisfiable),
    }
}

/// Solve the puzzle with default options, returning just the rendered grid.
pub fn solve(puzzle: &str, words: &[&str]) -> Result<String, SolveError> {
    solve_puzzle(puzzle, words, &SolverOptions::default()).map(|success| success.grid)
}
