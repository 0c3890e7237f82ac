//! Registration inputs
//!
//! [`Router::register`](crate::Router::register) accepts any shape that
//! converts into a [`Registration`]: a route, a group, a list of either, or
//! a nested list mixing both.

use crate::group::GroupRoute;
use crate::route::Route;
use gantry_core::Result;

/// Anything that can be registered on a router
#[derive(Debug, Clone)]
pub enum Registration {
    /// A single route
    Route(Route),
    /// A group and everything nested under it
    Group(GroupRoute),
    /// Several registrations
    List(Vec<Registration>),
}

impl Registration {
    /// Flatten into plain routes, in declaration order
    pub fn into_routes(self) -> Result<Vec<Route>> {
        let mut routes = Vec::new();
        self.collect(&mut routes)?;
        Ok(routes)
    }

    fn collect(self, routes: &mut Vec<Route>) -> Result<()> {
        match self {
            Registration::Route(route) => routes.push(route),
            Registration::Group(group) => routes.extend(group.flatten()?),
            Registration::List(items) => {
                for item in items {
                    item.collect(routes)?;
                }
            }
        }
        Ok(())
    }
}

impl From<Route> for Registration {
    fn from(route: Route) -> Self {
        Registration::Route(route)
    }
}

impl From<GroupRoute> for Registration {
    fn from(group: GroupRoute) -> Self {
        Registration::Group(group)
    }
}

impl From<Vec<Route>> for Registration {
    fn from(routes: Vec<Route>) -> Self {
        Registration::List(routes.into_iter().map(Registration::Route).collect())
    }
}

impl From<Vec<GroupRoute>> for Registration {
    fn from(groups: Vec<GroupRoute>) -> Self {
        Registration::List(groups.into_iter().map(Registration::Group).collect())
    }
}

impl From<Vec<Registration>> for Registration {
    fn from(items: Vec<Registration>) -> Self {
        Registration::List(items)
    }
}
