use super::{
    Statement, Writer, ident,
    predicate::{Predicate, render_all},
    qualify,
};

#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    /// A column of the selector's own scope.
    Column(String),
    /// A column of a joined table, addressed by the join alias.
    Joined { alias: String, column: String },
    Count,
    CountDistinct(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub column: String,
    pub desc: bool,
}

impl Order {
    pub fn asc<C: Into<String>>(column: C) -> Self {
        Self {
            column: column.into(),
            desc: false,
        }
    }

    pub fn desc<C: Into<String>>(column: C) -> Self {
        Self {
            column: column.into(),
            desc: true,
        }
    }
}

/// `LEFT JOIN table AS alias ON alias.column = scope.on_column [AND preds]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    pub column: String,
    pub on_column: String,
    pub predicates: Vec<Predicate>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Selector {
    table: String,
    alias: Option<String>,
    items: Vec<SelectItem>,
    joins: Vec<Join>,
    predicates: Vec<Predicate>,
    order: Vec<Order>,
    limit: Option<usize>,
    offset: Option<usize>,
    distinct: bool,
}

impl Selector {
    pub fn new<T: Into<String>>(table: T) -> Self {
        Self {
            table: table.into(),
            alias: None,
            items: Vec::new(),
            joins: Vec::new(),
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias<A: Into<String>>(mut self, alias: A) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Name that unqualified columns resolve against.
    pub fn scope(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// Qualified reference to a column of this selector's scope.
    pub fn c(&self, column: &str) -> String {
        qualify(self.scope(), column)
    }

    /// Replace the selected items with columns of the own scope.
    pub fn select<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.items = columns
            .into_iter()
            .map(|c| SelectItem::Column(c.into()))
            .collect();
        self
    }

    pub fn select_item(&mut self, item: SelectItem) -> &mut Self {
        self.items.push(item);
        self
    }

    pub fn set_items(&mut self, items: Vec<SelectItem>) -> &mut Self {
        self.items = items;
        self
    }

    pub fn join(&mut self, join: Join) -> &mut Self {
        self.joins.push(join);
        self
    }

    /// AND a predicate into the selector's filter.
    pub fn where_(&mut self, pred: Predicate) -> &mut Self {
        self.predicates.push(pred);
        self
    }

    pub fn filter(mut self, pred: Predicate) -> Self {
        self.predicates.push(pred);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn order_by(&mut self, order: Order) -> &mut Self {
        self.order.push(order);
        self
    }

    pub fn clear_order(&mut self) -> &mut Self {
        self.order.clear();
        self
    }

    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: usize) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    pub fn distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    pub fn build(&self) -> Statement {
        let mut w = Writer::default();
        self.render(&mut w);
        w.finish()
    }

    pub(crate) fn render(&self, w: &mut Writer) {
        let scope = self.scope().to_string();
        w.push("SELECT ");
        if self.distinct {
            w.push("DISTINCT ");
        }
        if self.items.is_empty() {
            w.push(&format!("{}.*", ident(&scope)));
        }
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            match item {
                SelectItem::Column(c) => w.push(&qualify(&scope, c)),
                SelectItem::Joined { alias, column } => w.push(&qualify(alias, column)),
                SelectItem::Count => w.push("COUNT(*)"),
                SelectItem::CountDistinct(c) => {
                    w.push(&format!("COUNT(DISTINCT {})", qualify(&scope, c)))
                }
            }
        }
        w.push(" FROM ");
        w.push(&ident(&self.table));
        if let Some(alias) = &self.alias {
            w.push(" AS ");
            w.push(&ident(alias));
        }
        for join in &self.joins {
            w.push(" LEFT JOIN ");
            w.push(&ident(&join.table));
            w.push(" AS ");
            w.push(&ident(&join.alias));
            w.push(" ON ");
            w.push(&qualify(&join.alias, &join.column));
            w.push(" = ");
            w.push(&qualify(&scope, &join.on_column));
            for pred in &join.predicates {
                w.push(" AND ");
                pred.render(&join.alias, w);
            }
        }
        if !self.predicates.is_empty() {
            w.push(" WHERE ");
            render_all(&scope, &self.predicates, w);
        }
        if !self.order.is_empty() {
            w.push(" ORDER BY ");
            for (i, order) in self.order.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.push(&qualify(&scope, &order.column));
                if order.desc {
                    w.push(" DESC");
                }
            }
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => w.push(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => w.push(&format!(" LIMIT {limit}")),
            // SQLite requires a LIMIT clause before OFFSET.
            (None, Some(offset)) => w.push(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
    }
}
