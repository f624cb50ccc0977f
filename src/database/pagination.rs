use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct PageContext<T> {
    pub rows: Vec<T>,
    pub total_rows: i64,
    pub next_offset: i64,
    pub prev_offset: i64,
    pub page_list: Vec<(String, i64)>,
    pub message: Option<String>,
}

impl<T> PageContext<T> {
    pub fn from_rows(rows: Vec<T>, total_rows: i64, page_size: i64, current_offset: i64) -> Self {
        if rows.is_empty() {
            return Self::no_rows();
        }

        let page_count = (total_rows + page_size - 1) / page_size;
        let last_offset = (page_count - 1) * page_size;

        let next_offset = (current_offset + page_size).min(last_offset);
        let prev_offset = (current_offset - page_size).max(0);

        let current_page = current_offset / page_size;
        let page_list = (0..page_count)
            .map(|n| {
                let label = if n == current_page {
                    String::from("...")
                } else {
                    format!("{}", n + 1)
                };

                (label, n * page_size)
            })
            .collect();

        Self {
            rows,
            total_rows,
            next_offset,
            prev_offset,
            page_list,
            message: Some(format!(
                "{} - {} / {}",
                current_offset,
                (current_offset + page_size).min(total_rows),
                total_rows
            )),
        }
    }

    pub fn no_rows() -> Self {
        Self {
            rows: vec![],
            total_rows: 0,
            next_offset: 0,
            prev_offset: 0,
            page_list: vec![(String::from("1"), 0)],
            message: Some(String::from("No results")),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageContext<U> {
        PageContext {
            rows: self.rows.into_iter().map(f).collect(),
            total_rows: self.total_rows,
            next_offset: self.next_offset,
            prev_offset: self.prev_offset,
            page_list: self.page_list,
            message: self.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rows_yield_the_empty_page() {
        let page: PageContext<i32> = PageContext::from_rows(vec![], 0, 10, 0);
        assert_eq!(page.total_rows, 0);
        assert_eq!(page.message, Some(String::from("No results")));
    }

    #[test]
    fn offsets_are_clamped_to_the_result_set() {
        let page = PageContext::from_rows(vec![1, 2, 3], 25, 10, 20);
        assert_eq!(page.next_offset, 20);
        assert_eq!(page.prev_offset, 10);
        assert_eq!(page.page_list.len(), 3);
    }

    #[test]
    fn current_page_is_highlighted() {
        let page = PageContext::from_rows(vec![1], 25, 10, 10);
        assert_eq!(page.page_list[1].0, "...");
        assert_eq!(page.page_list[0], (String::from("1"), 0));
        assert_eq!(page.page_list[2], (String::from("3"), 20));
    }
}
