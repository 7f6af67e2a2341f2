// Copyright 2026 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Pagination of list responses.

use serde::{Deserialize, Serialize};

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    50
}

/// Pagination query parameters, with 1-based pages.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    /// Requested page, starting at 1.
    #[serde(default = "default_page")]
    pub page: usize,
    /// Items per page.
    #[serde(rename = "pageSize", default = "default_page_size")]
    pub page_size: usize,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

/// One page of a list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Total items across all pages.
    pub total_items: usize,
    /// Items on this page.
    pub num_items: usize,
    /// Total number of pages.
    pub num_pages: usize,
    /// This page, 1-based.
    pub page: usize,
    /// The next page, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<usize>,
    /// The previous page, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<usize>,
    /// Page contents.
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// Slices `items` into the page described by `params`.
    pub fn paginate(items: Vec<T>, params: &PageParams) -> Self {
        let page_size = params.page_size.max(1);
        let total_items = items.len();
        let num_pages = total_items.div_ceil(page_size).max(1);
        let page = params.page.clamp(1, num_pages);

        let start = (page - 1) * page_size;
        let items: Vec<T> = items
            .into_iter()
            .skip(start)
            .take(page_size)
            .collect();

        Page {
            total_items,
            num_items: items.len(),
            num_pages,
            page,
            next: (page < num_pages).then_some(page + 1),
            prev: (page > 1).then_some(page - 1),
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginates_and_links_pages() {
        let items: Vec<u32> = (0..120).collect();
        let page = Page::paginate(
            items,
            &PageParams {
                page: 2,
                page_size: 50,
            },
        );

        assert_eq!(page.total_items, 120);
        assert_eq!(page.num_pages, 3);
        assert_eq!(page.num_items, 50);
        assert_eq!(page.items[0], 50);
        assert_eq!(page.next, Some(3));
        assert_eq!(page.prev, Some(1));
    }

    #[test]
    fn out_of_range_page_is_clamped() {
        let page = Page::paginate(
            vec![1u32, 2, 3],
            &PageParams {
                page: 99,
                page_size: 2,
            },
        );
        assert_eq!(page.page, 2);
        assert_eq!(page.items, vec![3]);
        assert_eq!(page.next, None);
    }

    #[test]
    fn empty_list_yields_single_empty_page() {
        let page = Page::paginate(Vec::<u32>::new(), &PageParams::default());
        assert_eq!(page.num_pages, 1);
        assert_eq!(page.page, 1);
        assert!(page.items.is_empty());
        assert_eq!(page.next, None);
        assert_eq!(page.prev, None);
    }
}
